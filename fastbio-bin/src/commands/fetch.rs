use std::io::Write;

use anyhow::Result;
use fastbio_lib::{
    BatchResponse, LogicalRequest, Method, RequestOptions, RetryPolicy, ServiceClient,
};
use http::HeaderMap;
use log::{error, info};

use super::CommandParams;
use crate::{
    ExitCode,
    client::{create, create_session},
    formatters::get_payload_formatter,
};

/// The requests of one invocation
#[derive(Debug, Clone)]
pub(crate) enum Batch {
    /// One `GET` per URL
    Get { urls: Vec<String> },
    /// One `POST` to `url` per body
    Post { url: String, bodies: Vec<Vec<u8>> },
}

impl Batch {
    fn requests(
        &self,
        client: &ServiceClient,
        options: &RequestOptions,
    ) -> fastbio_lib::Result<Vec<LogicalRequest>> {
        match self {
            Batch::Get { urls } => urls
                .iter()
                .map(|url| client.request(Method::Get, url, None, options))
                .collect(),
            Batch::Post { url, bodies } => bodies
                .iter()
                .map(|body| client.request(Method::Post, url, Some(body.clone()), options))
                .collect(),
        }
    }
}

/// Whether every request succeeded but nothing came back
fn all_empty(response: &BatchResponse) -> bool {
    response.is_success()
        && response
            .outcomes()
            .iter()
            .all(|outcome| outcome.payload().is_some_and(<[u8]>::is_empty))
}

/// Run a `get` or `post` command and write the payloads to `out`
pub(crate) async fn fetch(params: CommandParams<'_>, out: &mut impl Write) -> Result<ExitCode> {
    let CommandParams { cfg, args, batch } = params;

    let session = create_session(cfg)?;
    let client = create(cfg, &session)?;

    let options = RequestOptions {
        headers: HeaderMap::new(),
        cache_bypass: args.refresh,
    };
    let client = &client;
    let batch = &batch;

    // Repeated batches skip the cache
    let response = RetryPolicy::new(args.retry_empty, cfg.retry_wait)
        .retry_while(
            |attempt| {
                let options = options.clone().bypass_cache(options.cache_bypass || attempt > 0);
                async move {
                    if attempt > 0 {
                        info!("Every response was empty, repeating the batch (attempt {attempt})");
                    }
                    client.execute(batch.requests(client, &options)?).await
                }
            },
            |result| result.as_ref().is_ok_and(all_empty),
        )
        .await?;

    for failure in response.failures() {
        if let Some(e) = failure.error() {
            error!("[{}] {}: {e}", failure.index, failure.url);
        }
    }

    let stats = client.stats();
    out.write_all(&get_payload_formatter(args.format).format(&response, &stats)?)?;
    out.flush()?;

    if response.is_success() {
        Ok(ExitCode::Success)
    } else {
        error!(
            "{} of {} requests failed",
            response.failures().count(),
            response.len()
        );
        Ok(ExitCode::PartialFailure)
    }
}
