// ============================================================================
// AI OPERATIONS: remote generate/edit service seam
// ============================================================================
//
// The editor never talks to the network itself. Hosts implement
// `RemoteEditService` for whatever backend they use; the session hands it the
// current composite as PNG bytes plus a prompt and installs whatever images
// come back as new layers.

use thiserror::Error;

/// Errors a remote edit backend can report. All of them are surfaced to the
/// caller as one value; the editor never retries.
#[derive(Debug, Error)]
pub enum RemoteEditError {
    #[error("request timed out")]
    Timeout,
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("malformed response: {0}")]
    BadResponse(String),
}

/// "Request edit/generate(image bytes, prompt) → list of result images".
pub trait RemoteEditService {
    /// `image` is an encoded PNG of the current composite. Each returned
    /// buffer must decode to an RGBA image (any format `image` understands).
    fn request_edit(&mut self, image: &[u8], prompt: &str) -> Result<Vec<Vec<u8>>, RemoteEditError>;
}

impl<F> RemoteEditService for F
where
    F: FnMut(&[u8], &str) -> Result<Vec<Vec<u8>>, RemoteEditError>,
{
    fn request_edit(&mut self, image: &[u8], prompt: &str) -> Result<Vec<Vec<u8>>, RemoteEditError> {
        self(image, prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_act_as_services() {
        let mut calls = 0;
        let mut service = |image: &[u8], prompt: &str| {
            calls += 1;
            assert_eq!(prompt, "sky");
            Ok::<_, RemoteEditError>(vec![image.to_vec()])
        };
        let out = service.request_edit(&[1, 2, 3], "sky").unwrap();
        assert_eq!(out, vec![vec![1, 2, 3]]);
        assert_eq!(calls, 1);
    }

    #[test]
    fn errors_render_readably() {
        let err = RemoteEditError::Unavailable("503".into());
        assert_eq!(err.to_string(), "service unavailable: 503");
    }
}
