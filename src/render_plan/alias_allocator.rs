use std::collections::{HashMap, HashSet};

use super::errors::RenderBuildError;

/// Per-statement table alias allocation.
///
/// The first request for a base name gets the bare name (`g`), later ones get
/// a per-base monotonic suffix (`g0`, `g1`, ...). An alias is never handed out
/// twice within one statement.
#[derive(Debug, Default, Clone)]
pub struct AliasAllocator {
    used: HashSet<String>,
    counters: HashMap<String, usize>,
}

impl AliasAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh alias derived from `base`.
    pub fn allocate(&mut self, base: &str) -> String {
        let base = normalize_base(base);
        if self.used.insert(base.clone()) {
            return base;
        }
        let counter = self.counters.entry(base.clone()).or_insert(0);
        loop {
            let candidate = format!("{}{}", base, counter);
            *counter += 1;
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    /// Register an alias chosen elsewhere. Registering a name twice means two
    /// sources would share an alias.
    pub fn register(&mut self, alias: &str) -> Result<(), RenderBuildError> {
        if self.used.insert(alias.to_string()) {
            Ok(())
        } else {
            Err(RenderBuildError::AliasCollision(alias.to_string()))
        }
    }

    pub fn is_used(&self, alias: &str) -> bool {
        self.used.contains(alias)
    }

    pub fn reset(&mut self) {
        self.used.clear();
        self.counters.clear();
    }
}

/// Aliases start with a lower-case letter and contain only identifier characters.
fn normalize_base(base: &str) -> String {
    let cleaned: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect::<String>()
        .to_lowercase();
    match cleaned.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => cleaned,
        Some(_) => format!("t{}", cleaned),
        None => "t".to_string(),
    }
}

/// Alias base for a physical table: its first letter.
pub fn table_alias_base(table_name: &str) -> String {
    table_name
        .chars()
        .find(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_lowercase().to_string())
        .unwrap_or_else(|| "t".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_use_gets_bare_name() {
        let mut a = AliasAllocator::new();
        assert_eq!(a.allocate("g"), "g");
        assert_eq!(a.allocate("g"), "g0");
        assert_eq!(a.allocate("g"), "g1");
        assert_eq!(a.allocate("t"), "t");
    }

    #[test]
    fn test_counter_skips_names_taken_as_bases() {
        let mut a = AliasAllocator::new();
        assert_eq!(a.allocate("g0"), "g0");
        assert_eq!(a.allocate("g"), "g");
        assert_eq!(a.allocate("g"), "g1");
    }

    #[test]
    fn test_register_detects_collision() {
        let mut a = AliasAllocator::new();
        a.register("u").unwrap();
        assert_eq!(a.register("u"), Err(RenderBuildError::AliasCollision("u".into())));
        assert_eq!(a.allocate("u"), "u0");
    }

    #[test]
    fn test_reset_starts_over() {
        let mut a = AliasAllocator::new();
        a.allocate("t");
        a.reset();
        assert_eq!(a.allocate("t"), "t");
    }

    #[test]
    fn test_base_normalization() {
        let mut a = AliasAllocator::new();
        assert_eq!(a.allocate("Gears"), "gears");
        assert_eq!(a.allocate("1x"), "t1x");
        assert_eq!(a.allocate(""), "t");
        assert_eq!(table_alias_base("Officers"), "o");
        assert_eq!(table_alias_base("_x"), "x");
    }
}
