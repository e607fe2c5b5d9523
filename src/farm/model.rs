//! Resource types returned by and sent to the device farm.
//!
//! These mirror the service's resources closely but keep only the fields the
//! client actually reads. ARNs are carried as opaque strings: the client never
//! builds one, it only compares prefixes (see [`crate::report::suite_artifact_prefix`]).
//!
//! Enumerations the service may extend later are modelled with an `Other`
//! variant so that an unfamiliar value is shown to the user instead of being
//! rejected.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::test_type::TestType;

/// Declares a string-backed enum with a catch-all `Other` variant.
///
/// Generates `as_str`, `From<&str>`, `Display` and a string `Serialize`.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $wire:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
            /// A value this client does not know about.
            Other(String),
        }

        impl $name {
            /// The value as it appears on the wire.
            pub fn as_str(&self) -> &str {
                match self {
                    $( Self::$variant => $wire, )+
                    Self::Other(value) => value.as_str(),
                }
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                match value {
                    $( $wire => Self::$variant, )+
                    other => Self::Other(other.to_string()),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }
    };
}

wire_enum! {
    /// Kind of an upload: an application, a test package, a test spec or data.
    pub enum UploadKind {
        AndroidApp => "ANDROID_APP",
        IosApp => "IOS_APP",
        WebApp => "WEB_APP",
        ExternalData => "EXTERNAL_DATA",
        AppiumJavaJunitTestPackage => "APPIUM_JAVA_JUNIT_TEST_PACKAGE",
        AppiumJavaTestngTestPackage => "APPIUM_JAVA_TESTNG_TEST_PACKAGE",
        AppiumPythonTestPackage => "APPIUM_PYTHON_TEST_PACKAGE",
        AppiumNodeTestPackage => "APPIUM_NODE_TEST_PACKAGE",
        AppiumRubyTestPackage => "APPIUM_RUBY_TEST_PACKAGE",
        AppiumWebJavaJunitTestPackage => "APPIUM_WEB_JAVA_JUNIT_TEST_PACKAGE",
        AppiumWebJavaTestngTestPackage => "APPIUM_WEB_JAVA_TESTNG_TEST_PACKAGE",
        AppiumWebPythonTestPackage => "APPIUM_WEB_PYTHON_TEST_PACKAGE",
        AppiumWebNodeTestPackage => "APPIUM_WEB_NODE_TEST_PACKAGE",
        AppiumWebRubyTestPackage => "APPIUM_WEB_RUBY_TEST_PACKAGE",
        CalabashTestPackage => "CALABASH_TEST_PACKAGE",
        InstrumentationTestPackage => "INSTRUMENTATION_TEST_PACKAGE",
        UiautomationTestPackage => "UIAUTOMATION_TEST_PACKAGE",
        UiautomatorTestPackage => "UIAUTOMATOR_TEST_PACKAGE",
        XctestTestPackage => "XCTEST_TEST_PACKAGE",
        XctestUiTestPackage => "XCTEST_UI_TEST_PACKAGE",
        AppiumJavaJunitTestSpec => "APPIUM_JAVA_JUNIT_TEST_SPEC",
        AppiumJavaTestngTestSpec => "APPIUM_JAVA_TESTNG_TEST_SPEC",
        AppiumPythonTestSpec => "APPIUM_PYTHON_TEST_SPEC",
        AppiumNodeTestSpec => "APPIUM_NODE_TEST_SPEC",
        AppiumRubyTestSpec => "APPIUM_RUBY_TEST_SPEC",
        AppiumWebJavaJunitTestSpec => "APPIUM_WEB_JAVA_JUNIT_TEST_SPEC",
        AppiumWebJavaTestngTestSpec => "APPIUM_WEB_JAVA_TESTNG_TEST_SPEC",
        AppiumWebPythonTestSpec => "APPIUM_WEB_PYTHON_TEST_SPEC",
        AppiumWebNodeTestSpec => "APPIUM_WEB_NODE_TEST_SPEC",
        AppiumWebRubyTestSpec => "APPIUM_WEB_RUBY_TEST_SPEC",
        InstrumentationTestSpec => "INSTRUMENTATION_TEST_SPEC",
        XctestUiTestSpec => "XCTEST_UI_TEST_SPEC",
    }
}

wire_enum! {
    /// Processing state of an upload.
    pub enum UploadStatus {
        Initializing => "INITIALIZING",
        Processing => "PROCESSING",
        Succeeded => "SUCCEEDED",
        Failed => "FAILED",
    }
}

wire_enum! {
    /// Lifecycle state of a run, job or suite.
    pub enum ExecutionStatus {
        Pending => "PENDING",
        PendingConcurrency => "PENDING_CONCURRENCY",
        PendingDevice => "PENDING_DEVICE",
        Processing => "PROCESSING",
        Scheduling => "SCHEDULING",
        Preparing => "PREPARING",
        Running => "RUNNING",
        Completed => "COMPLETED",
        Stopping => "STOPPING",
    }
}

wire_enum! {
    /// Outcome of a run, job, suite or test.
    pub enum ExecutionResult {
        Pending => "PENDING",
        Passed => "PASSED",
        Warned => "WARNED",
        Failed => "FAILED",
        Skipped => "SKIPPED",
        Errored => "ERRORED",
        Stopped => "STOPPED",
    }
}

wire_enum! {
    /// Category used when listing artifacts. The service has no "all" query.
    pub enum ArtifactCategory {
        Log => "LOG",
        Screenshot => "SCREENSHOT",
        File => "FILE",
    }
}

wire_enum! {
    /// Whether a pool is managed by the service or by the caller.
    pub enum DevicePoolType {
        Curated => "CURATED",
        Private => "PRIVATE",
    }
}

impl ArtifactCategory {
    /// Every category, in the order reports walk them.
    pub const ALL: [ArtifactCategory; 3] = [
        ArtifactCategory::Log,
        ArtifactCategory::Screenshot,
        ArtifactCategory::File,
    ];
}

impl Default for ExecutionStatus {
    fn default() -> Self {
        ExecutionStatus::Pending
    }
}

impl Default for ExecutionResult {
    fn default() -> Self {
        ExecutionResult::Pending
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Project {
    pub arn: String,
    pub name: String,
    pub created: Option<DateTime<Utc>>,
}

/// A physical or virtual device that tests can target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub arn: String,
    pub name: String,
    pub os: String,
    pub model: String,
    pub platform: String,
    pub form_factor: String,
    pub manufacturer: String,
}

/// One inclusion rule of a private pool, e.g. `ARN IN ["arn:..."]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolRule {
    pub attribute: String,
    pub operator: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DevicePool {
    pub arn: String,
    pub name: String,
    pub description: Option<String>,
    pub pool_type: DevicePoolType,
    pub rules: Vec<PoolRule>,
}

/// A pending or completed artifact transfer into the farm.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Upload {
    pub arn: String,
    pub name: String,
    pub kind: UploadKind,
    pub content_type: Option<String>,
    /// Presigned destination. Only present while the upload can be written.
    pub url: Option<String>,
    pub status: UploadStatus,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Run {
    pub arn: String,
    pub name: String,
    pub platform: String,
    pub test_type: String,
    pub status: ExecutionStatus,
    pub result: ExecutionResult,
    pub created: Option<DateTime<Utc>>,
}

/// One device's execution within a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub arn: String,
    pub name: String,
    pub device: Option<Device>,
    pub status: ExecutionStatus,
    pub result: ExecutionResult,
}

impl Job {
    /// `"<job> - <device model> - <device os>"`, the report directory name.
    pub fn display_name(&self) -> String {
        match &self.device {
            Some(device) => format!("{} - {} - {}", self.name, device.model, device.os),
            None => format!("{} - unknown - unknown", self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suite {
    pub arn: String,
    pub name: String,
    pub status: ExecutionStatus,
    pub result: ExecutionResult,
    pub message: Option<String>,
}

/// A single test inside a suite.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteTest {
    pub arn: String,
    pub name: String,
    pub status: ExecutionStatus,
    pub result: ExecutionResult,
    pub message: Option<String>,
}

/// A distinct failure message and how often it occurred within a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UniqueProblem {
    pub result: ExecutionResult,
    pub message: String,
    pub occurrences: usize,
}

/// An output file produced somewhere under a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artifact {
    pub arn: String,
    pub name: String,
    pub extension: String,
    pub url: Option<String>,
    pub category: ArtifactCategory,
    /// Finer grained type reported by the service, e.g. `DEVICE_LOG`.
    pub kind: String,
}

impl Artifact {
    /// `<name>.<extension>`, or just the name when there is no extension.
    pub fn file_name(&self) -> String {
        if self.extension.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.name, self.extension)
        }
    }
}

/// Parameters of a create-upload call.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateUpload {
    pub project_arn: String,
    pub name: String,
    pub kind: UploadKind,
    pub content_type: Option<String>,
}

/// Parameters of a create-device-pool call.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateDevicePool {
    pub project_arn: String,
    pub name: String,
    pub description: String,
    pub rules: Vec<PoolRule>,
}

/// The test part of a schedule request.
#[derive(Debug, Clone, PartialEq)]
pub struct TestDescriptor {
    pub test_type: TestType,
    pub package_arn: Option<String>,
    pub spec_arn: Option<String>,
}

/// Parameters of a schedule-run call.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleRun {
    pub project_arn: String,
    pub name: String,
    pub app_arn: Option<String>,
    pub device_pool_arn: String,
    pub test: TestDescriptor,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_enum_round_trip() {
        assert_eq!(UploadKind::from("ANDROID_APP"), UploadKind::AndroidApp);
        assert_eq!(UploadKind::AndroidApp.as_str(), "ANDROID_APP");
        assert_eq!(
            ExecutionStatus::from("PENDING_DEVICE"),
            ExecutionStatus::PendingDevice
        );
    }

    #[test]
    fn test_wire_enum_keeps_unknown_values() {
        let status = ExecutionStatus::from("HIBERNATING");
        assert_eq!(status, ExecutionStatus::Other("HIBERNATING".to_string()));
        assert_eq!(status.to_string(), "HIBERNATING");
    }

    #[test]
    fn test_wire_enum_serializes_as_string() {
        let json = serde_json::to_string(&ArtifactCategory::Screenshot).unwrap();
        assert_eq!(json, "\"SCREENSHOT\"");
    }

    #[test]
    fn test_job_display_name() {
        let job = Job {
            arn: "arn:job".to_string(),
            name: "Pixel 5".to_string(),
            device: Some(Device {
                arn: "arn:device".to_string(),
                name: "Google Pixel 5".to_string(),
                os: "11".to_string(),
                model: "Pixel 5".to_string(),
                platform: "ANDROID".to_string(),
                form_factor: "PHONE".to_string(),
                manufacturer: "Google".to_string(),
            }),
            status: ExecutionStatus::Completed,
            result: ExecutionResult::Passed,
        };
        assert_eq!(job.display_name(), "Pixel 5 - Pixel 5 - 11");
    }

    #[test]
    fn test_artifact_file_name() {
        let mut artifact = Artifact {
            arn: "arn:artifact".to_string(),
            name: "Logcat".to_string(),
            extension: "logcat".to_string(),
            url: None,
            category: ArtifactCategory::Log,
            kind: "DEVICE_LOG".to_string(),
        };
        assert_eq!(artifact.file_name(), "Logcat.logcat");

        artifact.extension.clear();
        assert_eq!(artifact.file_name(), "Logcat");
    }
}
