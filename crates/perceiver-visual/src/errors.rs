///! Error types for visual perceiver operations
use std::fmt;

#[derive(Debug, Clone)]
pub enum VisualError {
    /// Screen capture failed
    CaptureFailed(String),

    /// Image processing error
    ImageProcessing(String),

    /// OCR operation failed
    OcrFailed(String),

    /// Template matching failed
    MatchFailed(String),

    /// Template could not be resolved from the store
    TemplateNotFound(String),

    /// Backend ran but found nothing for the query
    NoMatch(String),

    /// Invalid input parameters
    InvalidInput(String),

    /// IO error
    Io(String),

    /// Every instance of a fallback group failed, keyed by instance index
    AllInstancesFailed(Vec<(usize, VisualError)>),
}

impl VisualError {
    /// True when the backend answered but had no match.
    pub fn is_no_match(&self) -> bool {
        match self {
            Self::NoMatch(_) => true,
            Self::AllInstancesFailed(failures) => {
                !failures.is_empty() && failures.iter().all(|(_, err)| err.is_no_match())
            }
            _ => false,
        }
    }
}

impl fmt::Display for VisualError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CaptureFailed(msg) => write!(f, "Screen capture failed: {}", msg),
            Self::ImageProcessing(msg) => write!(f, "Image processing error: {}", msg),
            Self::OcrFailed(msg) => write!(f, "OCR operation failed: {}", msg),
            Self::MatchFailed(msg) => write!(f, "Template matching failed: {}", msg),
            Self::TemplateNotFound(msg) => write!(f, "Template not found: {}", msg),
            Self::NoMatch(msg) => write!(f, "No match: {}", msg),
            Self::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            Self::Io(msg) => write!(f, "IO error: {}", msg),
            Self::AllInstancesFailed(failures) => {
                write!(f, "All {} backend instance(s) failed", failures.len())?;
                for (index, err) in failures {
                    write!(f, "; [{}] {}", index, err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for VisualError {}

impl From<std::io::Error> for VisualError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<image::ImageError> for VisualError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageProcessing(err.to_string())
    }
}
