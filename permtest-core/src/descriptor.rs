use crate::probe::ProbeResult;

/// Namespace prepended to bare permission names.
pub const PERMISSION_NAMESPACE: &str = "android.permission.";

pub const DEFAULT_SDK_MIN: u32 = 0;
pub const DEFAULT_SDK_MAX: u32 = 100_000;

/// Returns the fully qualified form of a permission name.
///
/// Names without a dot are treated as platform permissions, e.g. `CAMERA` becomes
/// `android.permission.CAMERA`.
pub fn normalize_permission(permission: &str) -> String {
    if permission.contains('.') {
        permission.to_string()
    } else {
        format!("{PERMISSION_NAMESPACE}{permission}")
    }
}

/// Static metadata of one permission test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestDescriptor {
    pub permission: String,
    pub sdk_min: u32,
    pub sdk_max: u32,
    /// Name of the test method the descriptor was declared on.
    pub method: String,
    /// Permissions that have to be granted before the test can run.
    pub required_permissions: Vec<String>,
    /// Permissions the test asks for, for information only.
    pub requested_permissions: Vec<String>,
    pub development_protection: bool,
    pub ignore: bool,
}

impl TestDescriptor {
    pub fn new(permission: &str, method: impl Into<String>) -> TestDescriptor {
        TestDescriptor {
            permission: normalize_permission(permission),
            sdk_min: DEFAULT_SDK_MIN,
            sdk_max: DEFAULT_SDK_MAX,
            method: method.into(),
            required_permissions: Vec::new(),
            requested_permissions: Vec::new(),
            development_protection: false,
            ignore: false,
        }
    }

    /// Descriptor for a verdict produced outside of a declared test method, e.g. by a prepare
    /// phase.
    pub fn adhoc(permission: &str) -> TestDescriptor {
        TestDescriptor::new(permission, "")
    }

    pub fn sdk_min(mut self, sdk_min: u32) -> TestDescriptor {
        self.sdk_min = sdk_min;
        self
    }

    pub fn sdk_max(mut self, sdk_max: u32) -> TestDescriptor {
        self.sdk_max = sdk_max;
        self
    }

    pub fn required<I, S>(mut self, permissions: I) -> TestDescriptor
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.required_permissions = permissions
            .into_iter()
            .map(|p| normalize_permission(p.as_ref()))
            .collect();
        self
    }

    pub fn requested<I, S>(mut self, permissions: I) -> TestDescriptor
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.requested_permissions = permissions
            .into_iter()
            .map(|p| normalize_permission(p.as_ref()))
            .collect();
        self
    }

    pub fn development_protection(mut self, development_protection: bool) -> TestDescriptor {
        self.development_protection = development_protection;
        self
    }

    pub fn ignore(mut self, ignore: bool) -> TestDescriptor {
        self.ignore = ignore;
        self
    }

    /// Whether `sdk` falls in the inclusive supported range.
    pub fn supports_sdk(&self, sdk: u32) -> bool {
        self.sdk_min <= sdk && sdk <= self.sdk_max
    }
}

/// Test body of a module of type `M`.
pub type TestFn<M> = fn(&M) -> ProbeResult;

/// A descriptor paired with the function that runs it.
pub struct TestCase<M> {
    pub descriptor: TestDescriptor,
    pub run: TestFn<M>,
}

impl<M> TestCase<M> {
    pub fn new(descriptor: TestDescriptor, run: TestFn<M>) -> TestCase<M> {
        TestCase { descriptor, run }
    }
}

impl<M> Clone for TestCase<M> {
    fn clone(&self) -> Self {
        TestCase {
            descriptor: self.descriptor.clone(),
            run: self.run,
        }
    }
}

impl<M> std::fmt::Debug for TestCase<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCase")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_case::test_case;

    #[test_case("FOO" => "android.permission.FOO"; "bare name")]
    #[test_case("android.permission.CAMERA" => "android.permission.CAMERA"; "platform permission")]
    #[test_case("com.google.android.gms.permission.AD_ID" => "com.google.android.gms.permission.AD_ID"; "third party permission")]
    fn normalize(permission: &str) -> String {
        normalize_permission(permission)
    }

    #[test]
    fn descriptor_defaults() {
        let d = TestDescriptor::new("FOO", "test_foo");
        assert_eq!(d.permission, "android.permission.FOO");
        assert_eq!(d.sdk_min, 0);
        assert_eq!(d.sdk_max, 100_000);
        assert!(!d.ignore);
        assert!(!d.development_protection);
        assert!(d.required_permissions.is_empty());
    }

    #[test_case(34, 34, 34 => true; "single version")]
    #[test_case(36, 100_000, 34 => false; "below min")]
    #[test_case(0, 33, 34 => false; "above max")]
    fn supports_sdk(min: u32, max: u32, sdk: u32) -> bool {
        TestDescriptor::new("FOO", "test_foo")
            .sdk_min(min)
            .sdk_max(max)
            .supports_sdk(sdk)
    }

    #[test]
    fn required_permissions_are_normalized() {
        let d = TestDescriptor::new("FOO", "test_foo").required(["BAR", "a.b.BAZ"]);
        assert_eq!(
            d.required_permissions,
            vec!["android.permission.BAR", "a.b.BAZ"]
        );
    }
}
