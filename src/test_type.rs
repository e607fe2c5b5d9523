//! Test framework names and the upload kinds they require.
//!
//! Scheduling a run needs the test package (and optionally a test spec) to be
//! uploaded with a kind matching the framework. [`TestType::kinds`] is that
//! mapping; [`guess_app_kind`] picks the application kind from a file name.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::farm::UploadKind;

/// Errors raised while interpreting test or application types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TestTypeError {
    #[error("Unknown test type '{0}', you can use BUILTIN_FUZZ or BUILTIN_EXPLORER")]
    UnknownTestType(String),

    #[error("Can't guess app type of '{0}', expected an .apk or .ipa file")]
    UnguessableAppType(String),
}

/// A test framework supported by the device farm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestType {
    AppiumJavaJunit,
    AppiumJavaTestng,
    AppiumPython,
    AppiumNode,
    AppiumRuby,
    AppiumWebJavaJunit,
    AppiumWebJavaTestng,
    AppiumWebPython,
    AppiumWebNode,
    AppiumWebRuby,
    BuiltinFuzz,
    BuiltinExplorer,
    Calabash,
    Instrumentation,
    Uiautomation,
    Uiautomator,
    Xctest,
    XctestUi,
}

impl TestType {
    pub const ALL: [TestType; 18] = [
        TestType::AppiumJavaJunit,
        TestType::AppiumJavaTestng,
        TestType::AppiumPython,
        TestType::AppiumNode,
        TestType::AppiumRuby,
        TestType::AppiumWebJavaJunit,
        TestType::AppiumWebJavaTestng,
        TestType::AppiumWebPython,
        TestType::AppiumWebNode,
        TestType::AppiumWebRuby,
        TestType::BuiltinFuzz,
        TestType::BuiltinExplorer,
        TestType::Calabash,
        TestType::Instrumentation,
        TestType::Uiautomation,
        TestType::Uiautomator,
        TestType::Xctest,
        TestType::XctestUi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::AppiumJavaJunit => "APPIUM_JAVA_JUNIT",
            TestType::AppiumJavaTestng => "APPIUM_JAVA_TESTNG",
            TestType::AppiumPython => "APPIUM_PYTHON",
            TestType::AppiumNode => "APPIUM_NODE",
            TestType::AppiumRuby => "APPIUM_RUBY",
            TestType::AppiumWebJavaJunit => "APPIUM_WEB_JAVA_JUNIT",
            TestType::AppiumWebJavaTestng => "APPIUM_WEB_JAVA_TESTNG",
            TestType::AppiumWebPython => "APPIUM_WEB_PYTHON",
            TestType::AppiumWebNode => "APPIUM_WEB_NODE",
            TestType::AppiumWebRuby => "APPIUM_WEB_RUBY",
            TestType::BuiltinFuzz => "BUILTIN_FUZZ",
            TestType::BuiltinExplorer => "BUILTIN_EXPLORER",
            TestType::Calabash => "CALABASH",
            TestType::Instrumentation => "INSTRUMENTATION",
            TestType::Uiautomation => "UIAUTOMATION",
            TestType::Uiautomator => "UIAUTOMATOR",
            TestType::Xctest => "XCTEST",
            TestType::XctestUi => "XCTEST_UI",
        }
    }

    /// Upload kinds for the test package and the test spec.
    ///
    /// The built-in types run without an uploaded package, so both are `None`.
    /// Frameworks without custom environment support have no spec kind.
    pub fn kinds(&self) -> (Option<UploadKind>, Option<UploadKind>) {
        use UploadKind as K;

        let (package, spec) = match self {
            TestType::AppiumJavaJunit => (
                K::AppiumJavaJunitTestPackage,
                Some(K::AppiumJavaJunitTestSpec),
            ),
            TestType::AppiumJavaTestng => (
                K::AppiumJavaTestngTestPackage,
                Some(K::AppiumJavaTestngTestSpec),
            ),
            TestType::AppiumPython => (K::AppiumPythonTestPackage, Some(K::AppiumPythonTestSpec)),
            TestType::AppiumNode => (K::AppiumNodeTestPackage, Some(K::AppiumNodeTestSpec)),
            TestType::AppiumRuby => (K::AppiumRubyTestPackage, Some(K::AppiumRubyTestSpec)),
            TestType::AppiumWebJavaJunit => (
                K::AppiumWebJavaJunitTestPackage,
                Some(K::AppiumWebJavaJunitTestSpec),
            ),
            TestType::AppiumWebJavaTestng => (
                K::AppiumWebJavaTestngTestPackage,
                Some(K::AppiumWebJavaTestngTestSpec),
            ),
            TestType::AppiumWebPython => (
                K::AppiumWebPythonTestPackage,
                Some(K::AppiumWebPythonTestSpec),
            ),
            TestType::AppiumWebNode => {
                (K::AppiumWebNodeTestPackage, Some(K::AppiumWebNodeTestSpec))
            }
            TestType::AppiumWebRuby => {
                (K::AppiumWebRubyTestPackage, Some(K::AppiumWebRubyTestSpec))
            }
            TestType::BuiltinFuzz | TestType::BuiltinExplorer => return (None, None),
            TestType::Calabash => (K::CalabashTestPackage, None),
            TestType::Instrumentation => (
                K::InstrumentationTestPackage,
                Some(K::InstrumentationTestSpec),
            ),
            TestType::Uiautomation => (K::UiautomationTestPackage, None),
            TestType::Uiautomator => (K::UiautomatorTestPackage, None),
            TestType::Xctest => (K::XctestTestPackage, Some(K::XctestUiTestSpec)),
            TestType::XctestUi => (K::XctestUiTestPackage, Some(K::XctestUiTestSpec)),
        };
        (Some(package), spec)
    }

    /// Whether runs of this type need no uploaded test package.
    pub fn is_builtin(&self) -> bool {
        matches!(self, TestType::BuiltinFuzz | TestType::BuiltinExplorer)
    }
}

impl FromStr for TestType {
    type Err = TestTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TestType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| TestTypeError::UnknownTestType(s.to_string()))
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Guesses the application upload kind from the file extension.
///
/// `.apk` is an Android app and `.ipa` an iOS app, in any letter case.
pub fn guess_app_kind(path: &Path) -> Result<UploadKind, TestTypeError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("apk") => Ok(UploadKind::AndroidApp),
        Some("ipa") => Ok(UploadKind::IosApp),
        _ => Err(TestTypeError::UnguessableAppType(
            path.display().to_string(),
        )),
    }
}
