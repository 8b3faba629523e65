pub(crate) mod log;
pub(crate) mod output;

use self::output::{Json, PayloadFormatter, Raw};
use crate::options::OutputFormat;

/// Create a formatter for the payloads of a batch
pub(crate) fn get_payload_formatter(format: OutputFormat) -> Box<dyn PayloadFormatter> {
    match format {
        OutputFormat::Raw => Box::new(Raw),
        OutputFormat::Json => Box::new(Json),
    }
}
