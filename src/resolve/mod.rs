//! Slot resolvers.
//!
//! Each deterministic slot kind has one resolver behind the [`SlotResolver`]
//! capability interface. The NAS builder dispatches every non-AI content
//! item to the first resolver whose `can_resolve` matches and writes the
//! result into the snapshot.
//!
//! A resolver that cannot produce a value returns a [`ResolveFailure`]
//! carrying the warning code the builder should emit; resolution failures
//! are diagnostics, never panics.

mod builder;
mod computed;
mod lookup;
mod statik;
mod verbatim;

pub use builder::{ExpectedSlot, NasBuilder, NasResolution};
pub use computed::ComputedResolver;
pub use lookup::LookupResolver;
pub use statik::StaticResolver;
pub use verbatim::VerbatimResolver;

use serde_json::Value;

use crate::diag::WarningCode;
use crate::path::SlotPath;
use crate::template::{ContentItem, SlotKind};

/// Shared context handed to every resolver.
pub struct ResolveCtx<'a> {
    /// The raw source record.
    pub source: &'a Value,
}

/// A successfully resolved slot value.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField {
    /// Content item that produced the value.
    pub slot_id: String,
    /// Target path in the snapshot.
    pub path: SlotPath,
    /// The resolved value.
    pub value: Value,
}

/// A resolver's typed "no value" outcome.
///
/// The builder turns this into a warning whose severity depends on whether
/// the item was marked `required`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveFailure {
    /// Warning code the builder should emit.
    pub code: WarningCode,
    /// Human-readable reason.
    pub message: String,
}

impl ResolveFailure {
    /// Creates a failure with the given code and message.
    #[must_use]
    pub fn new(code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Capability interface implemented by each slot resolver.
pub trait SlotResolver: Send + Sync {
    /// Name of the resolver, for diagnostics.
    fn name(&self) -> &'static str;

    /// Returns `true` when this resolver handles the slot kind.
    fn can_resolve(&self, kind: SlotKind) -> bool;

    /// Resolves the item against the source record.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolveFailure`] naming the warning the builder should
    /// emit when no value can be produced.
    fn resolve(
        &self,
        item: &ContentItem,
        ctx: &ResolveCtx<'_>,
    ) -> Result<ResolvedField, ResolveFailure>;
}

/// The built-in resolver set, one per deterministic slot kind.
#[must_use]
pub fn default_resolvers() -> Vec<Box<dyn SlotResolver>> {
    vec![
        Box::new(LookupResolver),
        Box::new(StaticResolver),
        Box::new(ComputedResolver),
        Box::new(VerbatimResolver),
    ]
}

/// Parses the item's target path, mapping failures to a resolve failure.
pub(crate) fn target_path(item: &ContentItem) -> Result<SlotPath, ResolveFailure> {
    let raw = item.target_path.as_deref().ok_or_else(|| {
        ResolveFailure::new(WarningCode::MissingSource, "item has no targetPath")
    })?;
    SlotPath::parse_terminal_wildcard(raw).map_err(|e| {
        ResolveFailure::new(WarningCode::TypeMismatch, format!("invalid target path: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_resolvers_cover_all_non_ai_kinds() {
        let resolvers = default_resolvers();
        for kind in [
            SlotKind::Lookup,
            SlotKind::Static,
            SlotKind::Computed,
            SlotKind::Verbatim,
        ] {
            assert_eq!(
                resolvers.iter().filter(|r| r.can_resolve(kind)).count(),
                1,
                "exactly one resolver must claim {kind}"
            );
        }
        assert!(resolvers.iter().all(|r| !r.can_resolve(SlotKind::Ai)));
    }

    #[test]
    fn test_resolver_names_unique() {
        let resolvers = default_resolvers();
        let mut names: Vec<&str> = resolvers.iter().map(|r| r.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 4);
    }
}
