use crate::options::{Config, HeaderMapExt};
use anyhow::{Context, Result};
use fastbio_lib::{ClientBuilder, ServiceClient, Session, SessionBuilder, default_cache_dir};
use http::HeaderMap;
use std::path::PathBuf;

/// Directory of the response cache according to the config
pub(crate) fn cache_dir(cfg: &Config) -> PathBuf {
    cfg.cache_dir.clone().unwrap_or_else(default_cache_dir)
}

/// Creates the session shared by all requests of this run
pub(crate) fn create_session(cfg: &Config) -> Result<Session> {
    SessionBuilder::builder()
        .cache_dir(cache_dir(cfg))
        .cache_enabled(!cfg.no_cache)
        .max_cache_age(cfg.max_cache_age)
        .timeout(cfg.timeout)
        .user_agent(cfg.user_agent.clone())
        .build()
        .session()
        .context("Cannot create HTTP client")
}

/// Creates a client according to the command-line config
pub(crate) fn create(cfg: &Config, session: &Session) -> Result<ServiceClient> {
    let headers = HeaderMap::from_header_pairs(&cfg.header)?;

    ClientBuilder::builder()
        .service(cfg.service.clone().unwrap_or_default())
        .base_url(cfg.base_url.clone().unwrap_or_default())
        .requests_per_second(cfg.requests_per_second)
        .period(cfg.period)
        .cache_enabled(!cfg.no_cache)
        .max_concurrency(cfg.max_concurrency)
        .headers(headers)
        .max_retries(cfg.max_retries)
        .retry_wait(cfg.retry_wait)
        .build()
        .client(session)
        .context("Invalid client configuration")
}
