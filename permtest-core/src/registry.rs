//! Test case discovery.
//!
//! The tables are generated at build time by `#[permtest::tests]` and `#[permtest::module]`,
//! so discovery is a call rather than introspection. A table that panics while being built
//! yields an empty list.

use std::panic::{catch_unwind, UnwindSafe};
use tracing::*;

use crate::{
    descriptor::{TestCase, TestDescriptor},
    module::{ModuleMetadata, PermissionTests},
    preference::PreferenceDecl,
};

fn discover<T>(what: &str, module: &str, f: impl FnOnce() -> Vec<T> + UnwindSafe) -> Vec<T> {
    match catch_unwind(f) {
        Ok(found) => found,
        Err(_) => {
            warn!("failed to discover {what} of {module}");
            Vec::new()
        }
    }
}

/// Test cases of `M` in declaration order.
pub fn test_cases<M: PermissionTests>() -> Vec<TestCase<M>> {
    discover("test cases", std::any::type_name::<M>(), M::test_cases)
}

pub fn descriptors<M: PermissionTests>() -> Vec<TestDescriptor> {
    test_cases::<M>()
        .into_iter()
        .map(|case| case.descriptor)
        .collect()
}

/// Preference declarations of `M` in declaration order.
pub fn preferences<M: ModuleMetadata>() -> Vec<PreferenceDecl> {
    discover("preferences", std::any::type_name::<M>(), M::preferences)
}

/// `(kind, "label:key")` pairs of `M`'s preferences.
pub fn preference_pairs<M: ModuleMetadata>() -> Vec<(String, String)> {
    preferences::<M>().iter().map(PreferenceDecl::pair).collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        module::{ModuleDeclaration, ModuleMetadata, PermissionTests},
        testing::CoreTestModule,
    };
    use pretty_assertions::assert_eq;

    struct BrokenModule;

    impl ModuleMetadata for BrokenModule {
        fn declaration() -> ModuleDeclaration {
            ModuleDeclaration::new("Broken")
        }

        fn preferences() -> Vec<PreferenceDecl> {
            panic!("broken preference table")
        }
    }

    impl PermissionTests for BrokenModule {
        fn test_cases() -> Vec<TestCase<Self>> {
            panic!("broken test table")
        }
    }

    #[test]
    fn declaration_order_is_kept() {
        let permissions: Vec<_> = descriptors::<CoreTestModule>()
            .into_iter()
            .map(|d| d.permission)
            .collect();
        assert_eq!(
            permissions,
            vec![
                "android.permission.CAMERA",
                "android.permission.READ_CONTACTS",
                "android.permission.FUTURE_API",
            ]
        );
    }

    #[test]
    fn preference_pairs_of_module() {
        assert_eq!(
            preference_pairs::<CoreTestModule>(),
            vec![(
                "bool".to_string(),
                "Enable runtime confirmation:core_enable_runtime".to_string()
            )]
        );
    }

    #[test]
    fn broken_tables_yield_empty() {
        assert!(test_cases::<BrokenModule>().is_empty());
        assert!(preferences::<BrokenModule>().is_empty());
    }
}
