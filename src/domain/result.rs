//! Result type alias for labwatch

use super::errors::ReportError;

/// Result type alias for labwatch operations
///
/// # Examples
///
/// ```
/// use labwatch::domain::result::Result;
/// use labwatch::domain::errors::ReportError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(ReportError::Configuration("Invalid input".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, ReportError>;
