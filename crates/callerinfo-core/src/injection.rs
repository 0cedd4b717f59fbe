//! Injected value templates

use crate::error::ConfigWarning;
use crate::pattern::simple_name;

/// Placeholder for the source file of the calling class
pub const CLASS: &str = "%class";

/// Placeholder for the calling method
pub const METHOD: &str = "%method";

/// Placeholder for the source line of the call
pub const LINE: &str = "%line";

/// Recognized placeholders, in substitution order
pub const CONVERSIONS: [&str; 3] = [CLASS, METHOD, LINE];

/// Default template
pub const DEFAULT_TEMPLATE: &str = "%class:%line";

/// Default context key
pub const DEFAULT_KEY: &str = "callerInformation";

/// What gets stored in the context and under which key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionSpec {
    /// Template with `%class`, `%method` and `%line` placeholders
    pub template: String,
    /// Context key
    pub key: String,
    /// Keep the package in `%class`
    pub include_package_name: bool,
    /// Emit the `put` before each call
    pub inject: bool,
    /// Emit the `remove` after each call
    pub remove: bool,
}

impl Default for InjectionSpec {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
            key: DEFAULT_KEY.to_string(),
            include_package_name: false,
            inject: true,
            remove: true,
        }
    }
}

impl InjectionSpec {
    /// Spec with the given template and key, both toggles on
    pub fn new(template: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            key: key.into(),
            ..Self::default()
        }
    }

    /// Render the template for one call site.
    ///
    /// `class` is the internal name of the calling class; `%class` becomes its
    /// source file name, with the package path only if requested.
    pub fn substitute(&self, class: &str, method: &str, line: i32) -> String {
        let class = if self.include_package_name {
            class
        } else {
            simple_name(class)
        };
        self.template
            .replace(CLASS, &format!("{class}.java"))
            .replace(METHOD, method)
            .replace(LINE, &line.to_string())
    }

    /// Problems with this spec, in the order they are reported
    pub fn warnings(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        if self.template.is_empty() {
            warnings.push(ConfigWarning::EmptyTemplate);
        } else {
            let stripped = CONVERSIONS
                .iter()
                .fold(self.template.clone(), |text, word| text.replace(word, ""));
            if stripped.contains('%') {
                warnings.push(ConfigWarning::StrayPercent {
                    available: CONVERSIONS.join(", "),
                    template: self.template.clone(),
                });
            }
        }
        if !self.inject && !self.remove {
            warnings.push(ConfigWarning::NothingToEmit);
        }
        warnings
    }
}
