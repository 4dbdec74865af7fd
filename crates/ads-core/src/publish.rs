use core::future::Future;

use thiserror_no_std::Error;

use crate::reading::Reading;

/// Maximum length kept from a sink's failure description
pub const ERROR_DETAILS_LEN: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("{sink} rejected snapshot: {details}")]
    Rejected {
        sink: &'static str,
        details: heapless::String<ERROR_DETAILS_LEN>,
    },
    #[error("{0} is closed")]
    Closed(&'static str),
}

impl PublishError {
    /// Build a [`PublishError::Rejected`], truncating `details` to fit.
    pub fn rejected(sink: &'static str, details: &str) -> Self {
        let mut truncated = heapless::String::new();
        for c in details.chars() {
            if truncated.push(c).is_err() {
                break;
            }
        }
        Self::Rejected {
            sink,
            details: truncated,
        }
    }
}

/// An output destination for averaged snapshots.
pub trait Publish {
    /// Deliver one snapshot. Called only with a non-empty slice.
    fn publish(&mut self, readings: &[Reading]) -> impl Future<Output = Result<(), PublishError>>;

    /// Flush and release the destination.
    fn close(&mut self) -> Result<(), PublishError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;

    #[test]
    fn test_rejected_truncates_details() {
        let long: String = core::iter::repeat('x').take(200).collect();
        match PublishError::rejected("mqtt", &long) {
            PublishError::Rejected { sink, details } => {
                assert_eq!(sink, "mqtt");
                assert_eq!(details.len(), ERROR_DETAILS_LEN);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
