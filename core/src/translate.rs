//! Opt-in translation of status errors into domain errors.
//!
//! # Design
//! Translation is keyed on the status code alone. A matching candidate
//! replaces the `HttpError` wholesale; anything without a match, including
//! timeouts and connection failures, passes through untouched.
//!
//! ```
//! use habitica_core::{ApiError, DomainError, ErrorTranslator};
//!
//! const NOT_FOUND: DomainError = DomainError::new(404, "Task not found");
//! let translator = ErrorTranslator::new([NOT_FOUND]);
//!
//! let result: Result<(), ApiError> = translator.run(|| {
//!     Err(ApiError::HttpError { status: 404, reason: "Not Found".into(), body: String::new() })
//! });
//! assert!(matches!(result, Err(ApiError::Domain(e)) if e == NOT_FOUND));
//! ```

use crate::error::{ApiError, DomainError};

/// A reusable set of candidate domain errors.
#[derive(Debug, Clone, Default)]
pub struct ErrorTranslator {
    candidates: Vec<DomainError>,
}

impl ErrorTranslator {
    pub fn new(candidates: impl IntoIterator<Item = DomainError>) -> Self {
        Self {
            candidates: candidates.into_iter().collect(),
        }
    }

    pub fn candidates(&self) -> &[DomainError] {
        &self.candidates
    }

    /// Replace an `HttpError` whose status matches a candidate; return any
    /// other error unchanged.
    pub fn translate(&self, err: ApiError) -> ApiError {
        let Some(status) = err.status() else {
            return err;
        };
        match self.candidates.iter().find(|candidate| candidate.code == status) {
            Some(candidate) => ApiError::Domain(candidate.clone()),
            None => err,
        }
    }

    /// Run `call` inside the translation scope.
    pub fn run<T>(&self, call: impl FnOnce() -> Result<T, ApiError>) -> Result<T, ApiError> {
        call().map_err(|err| self.translate(err))
    }

    /// Guard a call site so every invocation is translated.
    pub fn wrap<'a, A, T, F>(&'a self, call: F) -> impl Fn(A) -> Result<T, ApiError> + 'a
    where
        A: 'a,
        T: 'a,
        F: Fn(A) -> Result<T, ApiError> + 'a,
    {
        move |arg| self.run(|| call(arg))
    }
}

/// One-shot form of `ErrorTranslator::run`.
pub fn translate_errors<T>(
    candidates: &[DomainError],
    call: impl FnOnce() -> Result<T, ApiError>,
) -> Result<T, ApiError> {
    ErrorTranslator::new(candidates.iter().cloned()).run(call)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const NOT_FOUND: DomainError = DomainError::new(404, "Task not found");
    const UNAUTHORIZED: DomainError = DomainError::new(401, "Missing or invalid credentials");

    fn status(status: u16) -> ApiError {
        ApiError::HttpError {
            status,
            reason: String::new(),
            body: format!(r#"{{"error":"E{status}"}}"#),
        }
    }

    #[test]
    fn matching_status_becomes_domain_error() {
        let translator = ErrorTranslator::new([NOT_FOUND, UNAUTHORIZED]);
        let err = translator.run(|| -> Result<(), _> { Err(status(404)) }).unwrap_err();
        assert!(matches!(err, ApiError::Domain(ref e) if *e == NOT_FOUND));
    }

    #[test]
    fn unmatched_status_is_returned_unchanged() {
        let translator = ErrorTranslator::new([NOT_FOUND]);
        let err = translator.run(|| -> Result<(), _> { Err(status(403)) }).unwrap_err();
        match err {
            ApiError::HttpError { status, body, .. } => {
                assert_eq!(status, 403);
                assert_eq!(body, r#"{"error":"E403"}"#);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn transport_failures_are_never_translated() {
        let translator = ErrorTranslator::new([NOT_FOUND]);
        let err = translator
            .run(|| -> Result<(), _> { Err(ApiError::Timeout(Duration::from_secs(10))) })
            .unwrap_err();
        assert!(matches!(err, ApiError::Timeout(_)));
    }

    #[test]
    fn success_passes_through() {
        let translator = ErrorTranslator::new([NOT_FOUND]);
        assert_eq!(translator.run(|| Ok(7)).unwrap(), 7);
    }

    #[test]
    fn wrapped_call_site_translates_every_invocation() {
        let translator = ErrorTranslator::new([NOT_FOUND]);
        let fetch = translator.wrap(|id: u16| if id == 0 { Ok("found") } else { Err(status(id)) });
        assert_eq!(fetch(0).unwrap(), "found");
        assert!(matches!(fetch(404), Err(ApiError::Domain(_))));
        assert!(matches!(fetch(500), Err(ApiError::HttpError { status: 500, .. })));
    }

    #[test]
    fn free_function_uses_candidate_slice() {
        let err = translate_errors(&[UNAUTHORIZED], || -> Result<(), _> { Err(status(401)) }).unwrap_err();
        assert!(matches!(err, ApiError::Domain(ref e) if e.code == 401));
    }
}
