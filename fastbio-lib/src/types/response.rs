use std::fmt::Display;

use url::Url;

use crate::{ErrorKind, Method, Result};

/// Raw bytes returned by a remote service
pub type Payload = Vec<u8>;

/// The result of a single slot of a batch
#[derive(Debug)]
pub struct Outcome {
    /// Position of the request in the submitted batch
    pub index: usize,
    /// Method of the originating request
    pub method: Method,
    /// URL of the originating request
    pub url: Url,
    /// Payload or the error which occurred while fetching it
    pub result: Result<Payload>,
}

impl Outcome {
    /// Whether this slot holds a payload
    #[inline]
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// The payload of this slot, if it succeeded
    #[must_use]
    pub fn payload(&self) -> Option<&[u8]> {
        self.result.as_deref().ok()
    }

    /// The error of this slot, if it failed
    #[must_use]
    pub fn error(&self) -> Option<&ErrorKind> {
        self.result.as_ref().err()
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.result {
            Ok(payload) => write!(
                f,
                "[{}] {} {} ({} bytes)",
                self.index,
                self.method,
                self.url,
                payload.len()
            ),
            Err(e) => write!(f, "[{}] {} {}: {e}", self.index, self.method, self.url),
        }
    }
}

/// Results of a batch, in the order the requests were submitted.
#[derive(Debug)]
pub struct BatchResponse {
    outcomes: Vec<Outcome>,
}

impl BatchResponse {
    pub(crate) const fn new(outcomes: Vec<Outcome>) -> Self {
        Self { outcomes }
    }

    /// Number of slots in this batch
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether the batch holds no slots at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// `true` if every slot holds a payload
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(Outcome::is_success)
    }

    /// All slots, in submission order
    #[must_use]
    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    /// Successful slots, in submission order
    pub fn successes(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    /// Failed slots, in submission order
    pub fn failures(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// Consume the batch and return its slots
    #[must_use]
    pub fn into_outcomes(self) -> Vec<Outcome> {
        self.outcomes
    }

    /// Return all payloads if every request succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::PartialFailure`] if at least one slot failed.
    /// The error still carries every successful payload.
    pub fn into_payloads(self) -> Result<Vec<Payload>> {
        if self.is_success() {
            return Ok(self
                .outcomes
                .into_iter()
                .filter_map(|outcome| outcome.result.ok())
                .collect());
        }
        Err(ErrorKind::PartialFailure(Box::new(PartialFailure {
            outcomes: self.outcomes,
        })))
    }
}

/// A batch in which some requests failed.
///
/// This is explicitly distinguishable from a full success and keeps every
/// outcome, so callers can still use the payloads which did arrive and tell
/// exactly which requests failed.
#[derive(Debug)]
pub struct PartialFailure {
    outcomes: Vec<Outcome>,
}

impl PartialFailure {
    /// All slots of the batch, in submission order
    #[must_use]
    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    /// The failed slots, in submission order
    pub fn failures(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// Indices of the failed slots
    #[must_use]
    pub fn failed_indices(&self) -> Vec<usize> {
        self.failures().map(|o| o.index).collect()
    }

    /// One entry per slot: the payload if it succeeded, `None` otherwise
    #[must_use]
    pub fn payloads(&self) -> Vec<Option<&[u8]>> {
        self.outcomes.iter().map(Outcome::payload).collect()
    }

    /// Number of successful slots
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Number of failed slots
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.outcomes.len() - self.success_count()
    }

    /// Consume the error and return all slots
    #[must_use]
    pub fn into_outcomes(self) -> Vec<Outcome> {
        self.outcomes
    }
}

impl Display for PartialFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} of {} requests failed",
            self.failure_count(),
            self.outcomes.len()
        )?;
        for (n, outcome) in self.failures().enumerate() {
            let separator = if n == 0 { ": " } else { "; " };
            write!(f, "{separator}{outcome}")?;
        }
        Ok(())
    }
}
