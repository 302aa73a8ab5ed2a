mod calendar_query;
mod helpers;
mod multiget;
