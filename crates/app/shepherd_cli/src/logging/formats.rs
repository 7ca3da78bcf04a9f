use std::io::Write;

use flexi_logger::{DeferredNow, style};
use log::Record;

/// `shepherd 12:00:00.000 WARN message`, with the level colored.
pub fn cli_format(
    w: &mut dyn Write,
    now: &mut DeferredNow,
    record: &Record,
) -> Result<(), std::io::Error> {
    let level = record.level();
    write!(
        w,
        "shepherd {} {} {}",
        now.format("%H:%M:%S%.3f"),
        style(level).paint(format!("{level:<5}")),
        record.args()
    )
}
