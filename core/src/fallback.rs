/// Resolves a value from the first of several progressively broader scopes
/// that defines it, generalizing the fallback chains spec.md §4.4 step 6
/// spells out for target type, health check, and attributes: "service-level
/// TGC; absent, gateway-level TGC; absent, LBC default; absent, the
/// hard-coded default."
///
/// Built as a tiny builder so every call site reads the same way regardless
/// of how many scopes it chains, instead of each fallback being hand-rolled
/// as nested `Option::or_else` calls.
pub struct FallbackChain<T> {
    value: Option<T>,
}

impl<T> FallbackChain<T> {
    pub fn new() -> Self {
        Self { value: None }
    }

    /// Adds a scope. Scopes are consulted in the order they're added; the
    /// first `Some` wins. Already-resolved chains skip evaluating `f`
    /// entirely, so expensive scope lookups (e.g. an LBC merge) can be
    /// passed as a closure without cost once an earlier scope resolves.
    pub fn or_else(mut self, f: impl FnOnce() -> Option<T>) -> Self {
        if self.value.is_none() {
            self.value = f();
        }
        self
    }

    pub fn or(self, value: Option<T>) -> Self {
        self.or_else(|| value)
    }

    pub fn resolve(self, default: T) -> T {
        self.value.unwrap_or(default)
    }

    pub fn into_option(self) -> Option<T> {
        self.value
    }
}

impl<T> Default for FallbackChain<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_scope_wins() {
        let v = FallbackChain::new()
            .or(Some("service"))
            .or(Some("gateway"))
            .resolve("default");
        assert_eq!(v, "service");
    }

    #[test]
    fn falls_through_to_default() {
        let v: &str = FallbackChain::new().or(None).or(None).resolve("default");
        assert_eq!(v, "default");
    }
}
