//! Reusable prepare and result hook policies.
//!
//! Modules call these from their own `prepare` and `result_hook` overrides.

use tracing::*;

use crate::{
    module::{HookContext, PrepareContext},
    verdict::Verdict,
};

/// Signature permissions are only granted to platform signed apps. Anywhere else every call
/// is expected to be denied, so the module runs inverted.
pub fn signature_prepare(cx: &mut PrepareContext<'_>) {
    let platform_signed = cx.signature().platform;
    if !platform_signed {
        debug!("app is not platform signed; expecting signature permissions to be denied");
    }
    cx.set_inverse_for_platform_testing(!platform_signed);
}

/// Development protected permissions must be granted exactly when the app is platform
/// signed. Any other combination fails the verdict.
pub fn development_protection_hook(cx: &HookContext<'_>, mut verdict: Verdict) -> Verdict {
    if verdict.development_protection && cx.signature().platform != verdict.granted {
        verdict.success = verdict.is_inverse;
    }
    verdict
}

/// A failure on a permission the platform does not know about, outside of inverse mode,
/// is reported as a bypass.
pub fn unrecognized_permission_hook(cx: &HookContext<'_>, mut verdict: Verdict) -> Verdict {
    if !verdict.success
        && !cx.inverse_test_result()
        && !cx.platform().is_permission_granted(verdict.permission())
    {
        debug!("{} looks unrecognized; bypassing", verdict.permission());
        verdict.bypassed = true;
    }
    verdict
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        descriptor::TestDescriptor,
        platform::{SignatureMatch, StaticPlatform},
        preference::MemoryPreferenceStore,
        runner::{Environment, Options},
    };
    use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
    use test_case::test_case;

    fn env(platform_signed: bool, inverse: bool) -> Environment {
        Environment::new(
            Arc::new(
                StaticPlatform::new(34)
                    .with_granted(["CAMERA"])
                    .with_signature(SignatureMatch {
                        platform: platform_signed,
                        gms: false,
                    }),
            ),
            Arc::new(MemoryPreferenceStore::new()),
        )
        .with_options(Options {
            inverse_test_result: inverse,
            ..Default::default()
        })
    }

    #[test_case(true => false; "platform signed")]
    #[test_case(false => true; "not platform signed")]
    fn signature(platform_signed: bool) -> bool {
        let env = env(platform_signed, false);
        let flag = AtomicBool::new(!platform_signed);
        let mut cx = PrepareContext::new(&env, &flag, 0);
        signature_prepare(&mut cx);
        flag.load(Ordering::SeqCst)
    }

    // (platform signed, granted, is_inverse) => success
    #[test_case(true, true, false => true; "signed and granted")]
    #[test_case(false, false, false => true; "unsigned and denied")]
    #[test_case(false, true, false => false; "unsigned but granted")]
    #[test_case(true, false, false => false; "signed but denied")]
    #[test_case(false, true, true => true; "unsigned but granted inverse")]
    fn development_protection(platform_signed: bool, granted: bool, is_inverse: bool) -> bool {
        let env = env(platform_signed, false);
        let verdict = Verdict {
            granted,
            is_inverse,
            ..Verdict::new(TestDescriptor::new("WRITE_SECURE", "test_write_secure").development_protection(true), true)
        };
        development_protection_hook(&HookContext::new(&env), verdict).success
    }

    #[test]
    fn development_protection_ignores_other_permissions() {
        let env = env(false, false);
        let verdict = Verdict {
            granted: true,
            ..Verdict::new(TestDescriptor::new("CAMERA", "test_camera"), true)
        };
        assert!(development_protection_hook(&HookContext::new(&env), verdict).success);
    }

    // (success, inverse, permission) => bypassed
    #[test_case(false, false, "UNKNOWN" => true; "failed unknown permission")]
    #[test_case(false, false, "CAMERA" => false; "failed granted permission")]
    #[test_case(false, true, "UNKNOWN" => false; "inverse mode")]
    #[test_case(true, false, "UNKNOWN" => false; "succeeded")]
    fn unrecognized(success: bool, inverse: bool, permission: &str) -> bool {
        let env = env(false, inverse);
        let verdict = Verdict::new(TestDescriptor::new(permission, "test_permission"), success);
        unrecognized_permission_hook(&HookContext::new(&env), verdict).bypassed
    }
}
