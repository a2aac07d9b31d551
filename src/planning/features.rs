//! Session-wide feature toggles.

use std::{collections::BTreeMap, fmt};

/// A named feature a unit can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Feature(&'static str);

impl Feature {
    /// Creates a feature.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Name of the feature
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// The flat feature configuration of one compilation session.
///
/// Features that were never set count as disabled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Features {
    flags: BTreeMap<String, bool>,
}

impl Features {
    /// Creates a configuration with every feature disabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a comma separated list, `name` enables and `-name` disables a feature.
    ///
    /// ```rust
    /// use passplan::planning::{Feature, Features};
    ///
    /// let features = Features::parse("shrink, obfuscate,-optimize");
    /// assert!(features.is_enabled(Feature::new("obfuscate")));
    /// assert!(!features.is_enabled(Feature::new("optimize")));
    /// ```
    #[must_use]
    pub fn parse(list: &str) -> Self {
        list.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| match item.strip_prefix('-') {
                Some(name) => (name.to_string(), false),
                None => (item.to_string(), true),
            })
            .collect()
    }

    /// Enables a feature.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>) -> Self {
        self.flags.insert(name.into(), true);
        self
    }

    /// Sets a feature.
    pub fn set(&mut self, name: impl Into<String>, enabled: bool) {
        self.flags.insert(name.into(), enabled);
    }

    /// Returns true if `feature` is enabled.
    #[must_use]
    pub fn is_enabled(&self, feature: Feature) -> bool {
        self.flags.get(feature.name()).copied().unwrap_or(false)
    }

    /// Returns the first feature of `features` that is not enabled.
    #[must_use]
    pub fn first_disabled<'a>(
        &self,
        features: impl IntoIterator<Item = &'a Feature>,
    ) -> Option<Feature> {
        features
            .into_iter()
            .find(|feature| !self.is_enabled(**feature))
            .copied()
    }

    /// Iterates all explicitly set features.
    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.flags.iter().map(|(name, enabled)| (name.as_str(), *enabled))
    }
}

impl<S: Into<String>> FromIterator<(S, bool)> for Features {
    fn from_iter<I: IntoIterator<Item = (S, bool)>>(iter: I) -> Self {
        Self {
            flags: iter
                .into_iter()
                .map(|(name, enabled)| (name.into(), enabled))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHRINK: Feature = Feature::new("shrink");
    const OBFUSCATE: Feature = Feature::new("obfuscate");

    #[test]
    fn test_unset_is_disabled() {
        let features = Features::new();
        assert!(!features.is_enabled(SHRINK));
        assert_eq!(features.first_disabled(&[SHRINK]), Some(SHRINK));
        assert_eq!(features.first_disabled(&[]), None);
    }

    #[test]
    fn test_parse() {
        let features = Features::parse(" shrink ,,-obfuscate");
        assert!(features.is_enabled(SHRINK));
        assert!(!features.is_enabled(OBFUSCATE));
        assert_eq!(features.iter().count(), 2);
    }

    #[test]
    fn test_builder_and_set() {
        let mut features = Features::new().with("shrink");
        features.set("obfuscate", true);
        assert_eq!(features.first_disabled(&[SHRINK, OBFUSCATE]), None);
        features.set("shrink", false);
        assert_eq!(features.first_disabled(&[SHRINK, OBFUSCATE]), Some(SHRINK));
    }
}
