mod activity;
mod record;

pub use activity::{parse_date, Activity};
pub use record::Record;
