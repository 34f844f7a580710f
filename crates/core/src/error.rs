use thiserror::Error;

use crate::model::DictionaryError;
use crate::quiz::QuizError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Dictionary(#[from] DictionaryError),
    #[error(transparent)]
    Quiz(#[from] QuizError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_layer_errors_transparently() {
        let err: Error = QuizError::EmptyDictionary.into();
        assert_eq!(err.to_string(), "dictionary has no entries");
        let err: Error = DictionaryError::EmptyName.into();
        assert!(matches!(err, Error::Dictionary(DictionaryError::EmptyName)));
    }
}
