use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Calculation error in metric '{0}'")]
    Calculation(String),
}
