use thiserror::Error;

use crate::caldav::MatchError;
use crate::caldav::service::QueryError;
use crate::store::StoreError;

/// Service layer errors - combines all error types
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    RfcError(#[from] almanac_rfc::error::RfcError),

    #[error(transparent)]
    CoreError(#[from] almanac_core::error::CoreError),

    #[error(transparent)]
    StoreError(#[from] StoreError),

    #[error(transparent)]
    MatchError(#[from] MatchError),

    #[error(transparent)]
    QueryError(#[from] QueryError),
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
