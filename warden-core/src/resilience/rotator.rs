//! Endpoint rotation across interchangeable backend nodes
//!
//! Holds a fixed ordered list of candidate endpoints and the currently
//! selected index. The manager advances the rotation exactly once per
//! failed connection attempt, never on success.

use crate::error::WardenError;

/// Cyclic selector over a fixed, non-empty endpoint list.
///
/// The list is immutable after construction; duplicates are allowed and
/// not deduplicated.
#[derive(Debug, Clone)]
pub struct EndpointRotator {
    endpoints: Vec<String>,
    index: usize,
}

impl EndpointRotator {
    /// Fails with a configuration error on an empty endpoint set; the
    /// manager must not run without at least one endpoint.
    pub fn new(endpoints: Vec<String>) -> Result<Self, WardenError> {
        if endpoints.is_empty() {
            return Err(WardenError::Configuration(
                "endpoint set must not be empty".to_string(),
            ));
        }
        Ok(Self {
            endpoints,
            index: 0,
        })
    }

    /// Currently selected endpoint.
    pub fn current(&self) -> &str {
        &self.endpoints[self.index]
    }

    /// Select the next endpoint (wrapping) and return it.
    pub fn advance(&mut self) -> &str {
        self.index = (self.index + 1) % self.endpoints.len();
        self.current()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn endpoints(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("node-{i}:7000")).collect()
    }

    #[test]
    fn test_empty_set_is_configuration_error() {
        let err = EndpointRotator::new(Vec::new()).unwrap_err();
        assert!(matches!(err, WardenError::Configuration(_)));
    }

    #[test]
    fn test_starts_at_first_endpoint() {
        let rotator = EndpointRotator::new(endpoints(3)).unwrap();
        assert_eq!(rotator.current(), "node-0:7000");
        assert_eq!(rotator.index(), 0);
    }

    #[test]
    fn test_advance_wraps() {
        let mut rotator = EndpointRotator::new(endpoints(3)).unwrap();
        assert_eq!(rotator.advance(), "node-1:7000");
        assert_eq!(rotator.advance(), "node-2:7000");
        assert_eq!(rotator.advance(), "node-0:7000");
    }

    #[test]
    fn test_single_endpoint_always_selected() {
        let mut rotator = EndpointRotator::new(endpoints(1)).unwrap();
        assert_eq!(rotator.advance(), "node-0:7000");
        assert_eq!(rotator.advance(), "node-0:7000");
    }

    proptest! {
        #[test]
        fn prop_n_advances_return_to_start(n in 1usize..32) {
            let mut rotator = EndpointRotator::new(endpoints(n)).unwrap();
            let start = rotator.current().to_string();

            for _ in 0..n {
                rotator.advance();
            }

            prop_assert_eq!(rotator.current(), start);
            prop_assert_eq!(rotator.index(), 0);
        }
    }
}
