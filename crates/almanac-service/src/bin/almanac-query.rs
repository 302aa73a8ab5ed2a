use almanac_core::config::load_config;
use almanac_rfc::rfc::dav::core::{
    CalendarDataRequest, CalendarQuery, ComponentFilter, ReportProperties, TimeRange,
};
use almanac_service::caldav::service::{
    QueryError, QueryLimits, evaluate_calendar_query, query_timezone,
};
use almanac_service::error::ServiceError;
use almanac_service::cancel::CancellationFlag;
use almanac_service::store::{ChronoTzRegistry, DirectoryStore};
use anyhow::{Context, bail};
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt};

const USAGE: &str =
    "usage: almanac-query <dir> [<start> <end>] [--tz <TZID> | --tz-file <VTIMEZONE.ics>] [--data]";

struct Args {
    dir: String,
    range: Option<TimeRange>,
    tzid: Option<String>,
    tz_file: Option<String>,
    data: bool,
}

fn parse_instant(value: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(instant.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%SZ")
        .map(|naive| naive.and_utc())
        .with_context(|| format!("invalid instant {value:?}, expected RFC 3339 or 20241001T000000Z"))
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Args> {
    let mut positional = Vec::new();
    let mut tzid = None;
    let mut tz_file = None;
    let mut data = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--data" => data = true,
            "--tz" => tzid = Some(args.next().context("--tz needs a value")?),
            "--tz-file" => tz_file = Some(args.next().context("--tz-file needs a path")?),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let Some(dir) = positional.next() else {
        bail!(USAGE);
    };
    let range = match (positional.next(), positional.next()) {
        (None, None) => None,
        (Some(start), Some(end)) => Some(TimeRange::between(parse_instant(&start)?, parse_instant(&end)?)),
        _ => bail!(USAGE),
    };
    if positional.next().is_some() {
        bail!(USAGE);
    }

    Ok(Args {
        dir,
        range,
        tzid,
        tz_file,
        data,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (filter_layer, filter_handle) = reload::Layer::new(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();

    let config = load_config()?;

    if let Ok(filter) = EnvFilter::try_new(config.logging.level.as_str()) {
        if let Err(e) = filter_handle.modify(|current| *current = filter) {
            tracing::warn!(error = %e, "Failed to update log filter from config");
        }
    } else {
        tracing::warn!(level = %config.logging.level, "Invalid log level in config, keeping debug");
    }

    let args = parse_args(std::env::args().skip(1))?;

    let mut events = ComponentFilter::new("VEVENT");
    if let Some(range) = args.range {
        events = events.with_time_range(range);
    }
    let mut properties = ReportProperties::etag_only();
    if args.data {
        properties = properties.with_calendar_data(CalendarDataRequest::full());
    }
    let mut query = CalendarQuery::new(ComponentFilter::vcalendar().with_comp_filter(events))
        .with_properties(properties);
    let inline = match &args.tz_file {
        Some(path) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {path}"))?,
        ),
        None => None,
    };
    match query_timezone(inline.as_deref(), args.tzid) {
        Ok(Some(timezone)) => query = query.with_timezone(timezone),
        Ok(None) => {}
        Err(ServiceError::QueryError(err)) => reject(&err),
        Err(ServiceError::RfcError(err)) => reject(&QueryError::InvalidTimezone(err.to_string())),
        Err(err) => return Err(err.into()),
    }

    let store = DirectoryStore::new(&args.dir);
    let limits = QueryLimits::from(&config);
    let cancel = CancellationFlag::new();

    match evaluate_calendar_query(&store, &ChronoTzRegistry, &query, &limits, &cancel).await {
        Ok(report) => {
            for result in &report.results {
                println!(
                    "{}\t{}\t{}",
                    result.name,
                    result.payload.etag.as_deref().unwrap_or("-"),
                    result.instances.len()
                );
                if let Some(data) = &result.payload.calendar_data {
                    print!("{data}");
                }
            }
            for failure in &report.failures {
                eprintln!("{}: {}", failure.name, failure.reason);
            }
            Ok(())
        }
        Err(err) => reject(&err),
    }
}

/// Reports a whole-query failure with its condition code and exits.
fn reject(err: &QueryError) -> ! {
    match err.precondition() {
        Some(condition) => eprintln!("{}: {err}", condition.qualified_name()),
        None => eprintln!("Query failed: {err}"),
    }
    std::process::exit(1);
}
