pub(crate) mod cache;
pub(crate) mod fetch;

pub(crate) use cache::cache;
pub(crate) use fetch::{Batch, fetch};

use crate::options::{Config, RequestArgs};

/// Parameters passed to the `get` and `post` commands
pub(crate) struct CommandParams<'a> {
    pub(crate) cfg: &'a Config,
    pub(crate) args: &'a RequestArgs,
    pub(crate) batch: Batch,
}
