//! Typed interface and display configurations.
//!
//! Interfaces decide how a field is edited, displays how it is rendered. The
//! engine inspects both to decide whether a field gets a physical column and
//! which data types it may use, so their options are parsed into typed
//! variants. Presentation-only interfaces carry their options through as
//! opaque JSON.

use super::data_type::{DataType, ALL_TYPES};
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputOptions {
    pub placeholder: Option<String>,
    pub trim: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub soft_length: Option<u32>,
    pub masked: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MultilineOptions {
    pub placeholder: Option<String>,
    pub trim: bool,
    pub soft_length: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RichTextOptions {
    pub toolbar: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CodeOptions {
    pub language: Option<String>,
    pub line_number: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BooleanOptions {
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatetimeOptions {
    pub include_seconds: bool,
    pub use_24: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Choice {
    pub text: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SelectOptions {
    pub choices: Vec<Choice>,
    pub allow_other: bool,
    pub allow_none: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TagsOptions {
    pub presets: Vec<String>,
    pub alphabetize: bool,
    pub trim: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SliderOptions {
    pub min: f64,
    pub max: f64,
    #[serde(default = "default_step")]
    pub step: f64,
}

fn default_step() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelationOptions {
    pub template: Option<String>,
}

/// Editing variant of a field, keyed by interface id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "interface", content = "options", rename_all = "kebab-case")]
pub enum InterfaceConfig {
    Input(InputOptions),
    InputMultiline(MultilineOptions),
    InputRichTextHtml(RichTextOptions),
    InputCode(CodeOptions),
    Boolean(BooleanOptions),
    Datetime(DatetimeOptions),
    SelectDropdown(SelectOptions),
    SelectMultipleDropdown(SelectOptions),
    Tags(TagsOptions),
    Slider(SliderOptions),
    SelectDropdownM2o(RelationOptions),
    PresentationDivider(Value),
    PresentationNotice(Value),
    GroupRaw(Value),
    GroupDetail(Value),
    Alias(Value),
}

/// Interface ids the engine recognises.
pub const INTERFACE_IDS: &[&str] = &[
    "input",
    "input-multiline",
    "input-rich-text-html",
    "input-code",
    "boolean",
    "datetime",
    "select-dropdown",
    "select-multiple-dropdown",
    "tags",
    "slider",
    "select-dropdown-m2o",
    "presentation-divider",
    "presentation-notice",
    "group-raw",
    "group-detail",
    "alias",
];

/// Interfaces that never own a physical column.
pub const VIRTUAL_INTERFACE_IDS: &[&str] = &[
    "presentation-divider",
    "presentation-notice",
    "group-raw",
    "group-detail",
    "alias",
];

impl InterfaceConfig {
    /// Builds a typed interface from its id and raw options.
    pub fn from_parts(id: &str, options: Option<Value>) -> Result<Self, ValidationError> {
        if !INTERFACE_IDS.contains(&id) {
            return Err(ValidationError::IncompatibleFieldConfig(format!(
                "unknown interface '{}'",
                id
            )));
        }
        let options = match options {
            Some(Value::Null) | None => json!({}),
            Some(v) => v,
        };
        let parsed: Self = serde_json::from_value(json!({ "interface": id, "options": options }))
            .map_err(|e| {
                ValidationError::IncompatibleFieldConfig(format!(
                    "invalid options for interface '{}': {}",
                    id, e
                ))
            })?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn id(&self) -> &'static str {
        match self {
            Self::Input(_) => "input",
            Self::InputMultiline(_) => "input-multiline",
            Self::InputRichTextHtml(_) => "input-rich-text-html",
            Self::InputCode(_) => "input-code",
            Self::Boolean(_) => "boolean",
            Self::Datetime(_) => "datetime",
            Self::SelectDropdown(_) => "select-dropdown",
            Self::SelectMultipleDropdown(_) => "select-multiple-dropdown",
            Self::Tags(_) => "tags",
            Self::Slider(_) => "slider",
            Self::SelectDropdownM2o(_) => "select-dropdown-m2o",
            Self::PresentationDivider(_) => "presentation-divider",
            Self::PresentationNotice(_) => "presentation-notice",
            Self::GroupRaw(_) => "group-raw",
            Self::GroupDetail(_) => "group-detail",
            Self::Alias(_) => "alias",
        }
    }

    /// Virtual interfaces exist in metadata only.
    pub fn is_virtual(&self) -> bool {
        VIRTUAL_INTERFACE_IDS.contains(&self.id())
    }

    /// Data types this interface can edit. Empty for virtual interfaces.
    pub fn supported_types(&self) -> &'static [DataType] {
        use DataType::*;
        match self {
            Self::Input(_) => &[String, Text, Integer, BigInteger, Float, Decimal, Uuid],
            Self::InputMultiline(_) => &[Text, String],
            Self::InputRichTextHtml(_) => &[Text],
            Self::InputCode(_) => &[Text, String, Json],
            Self::Boolean(_) => &[Boolean],
            Self::Datetime(_) => &[DateTime, Date, Time],
            Self::SelectDropdown(_) => &[String, Integer, BigInteger, Float, Decimal],
            Self::SelectMultipleDropdown(_) | Self::Tags(_) => &[Json, Csv],
            Self::Slider(_) => &[Integer, BigInteger, Float, Decimal],
            Self::SelectDropdownM2o(_) => &[Uuid, Integer, BigInteger, String],
            Self::PresentationDivider(_)
            | Self::PresentationNotice(_)
            | Self::GroupRaw(_)
            | Self::GroupDetail(_)
            | Self::Alias(_) => &[],
        }
    }

    /// Type used when a physical field is declared without a column schema.
    pub fn default_type(&self) -> Option<DataType> {
        self.supported_types().first().copied()
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let fail = |msg: &str| {
            Err(ValidationError::IncompatibleFieldConfig(format!(
                "interface '{}': {}",
                self.id(),
                msg
            )))
        };
        match self {
            Self::Input(o) => {
                if let (Some(min), Some(max)) = (o.min, o.max) {
                    if min > max {
                        return fail("min must not exceed max");
                    }
                }
            }
            Self::SelectDropdown(o) | Self::SelectMultipleDropdown(o) => {
                if o.choices.is_empty() {
                    return fail("choices must not be empty");
                }
            }
            Self::Slider(o) => {
                if o.min >= o.max {
                    return fail("min must be less than max");
                }
                if o.step <= 0.0 {
                    return fail("step must be positive");
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FormattedValueOptions {
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub format_number: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BooleanDisplayOptions {
    pub label_on: Option<String>,
    pub label_off: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatetimeDisplayOptions {
    pub relative: bool,
    pub format: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LabelsOptions {
    pub choices: Vec<Choice>,
}

/// Read-side rendering variant of a field, keyed by display id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "display", content = "options", rename_all = "kebab-case")]
pub enum DisplayConfig {
    Raw(Value),
    FormattedValue(FormattedValueOptions),
    Boolean(BooleanDisplayOptions),
    Datetime(DatetimeDisplayOptions),
    Labels(LabelsOptions),
    RelatedValues(RelationOptions),
    Color(Value),
}

pub const DISPLAY_IDS: &[&str] = &[
    "raw",
    "formatted-value",
    "boolean",
    "datetime",
    "labels",
    "related-values",
    "color",
];

impl DisplayConfig {
    pub fn from_parts(id: &str, options: Option<Value>) -> Result<Self, ValidationError> {
        if !DISPLAY_IDS.contains(&id) {
            return Err(ValidationError::IncompatibleFieldConfig(format!(
                "unknown display '{}'",
                id
            )));
        }
        let options = match options {
            Some(Value::Null) | None => json!({}),
            Some(v) => v,
        };
        serde_json::from_value(json!({ "display": id, "options": options })).map_err(|e| {
            ValidationError::IncompatibleFieldConfig(format!(
                "invalid options for display '{}': {}",
                id, e
            ))
        })
    }

    pub fn id(&self) -> &'static str {
        match self {
            Self::Raw(_) => "raw",
            Self::FormattedValue(_) => "formatted-value",
            Self::Boolean(_) => "boolean",
            Self::Datetime(_) => "datetime",
            Self::Labels(_) => "labels",
            Self::RelatedValues(_) => "related-values",
            Self::Color(_) => "color",
        }
    }

    pub fn supported_types(&self) -> &'static [DataType] {
        use DataType::*;
        match self {
            Self::Raw(_) => ALL_TYPES,
            Self::FormattedValue(_) => &[String, Text, Integer, BigInteger, Float, Decimal],
            Self::Boolean(_) => &[Boolean],
            Self::Datetime(_) => &[DateTime, Date, Time],
            Self::Labels(_) => &[String, Json, Csv],
            Self::RelatedValues(_) => &[Uuid, Integer, BigInteger, String],
            Self::Color(_) => &[String],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_typed_options() {
        let iface =
            InterfaceConfig::from_parts("slider", Some(json!({"min": 0, "max": 10, "step": 2})))
                .unwrap();
        assert_eq!(
            iface,
            InterfaceConfig::Slider(SliderOptions {
                min: 0.0,
                max: 10.0,
                step: 2.0
            })
        );
        assert!(!iface.is_virtual());
        assert!(iface.supported_types().contains(&DataType::Integer));
    }

    #[test]
    fn rejects_unknown_ids_and_bad_options() {
        assert!(matches!(
            InterfaceConfig::from_parts("wysiwyg-9000", None),
            Err(ValidationError::IncompatibleFieldConfig(_))
        ));
        assert!(InterfaceConfig::from_parts("input", Some(json!({"bogus": true}))).is_err());
        assert!(InterfaceConfig::from_parts("select-dropdown", None).is_err());
        assert!(
            InterfaceConfig::from_parts("slider", Some(json!({"min": 5, "max": 1}))).is_err()
        );
    }

    #[test]
    fn presentation_interfaces_are_virtual_and_opaque() {
        let iface = InterfaceConfig::from_parts(
            "presentation-notice",
            Some(json!({"text": "Read me", "color": "warning"})),
        )
        .unwrap();
        assert!(iface.is_virtual());
        assert!(iface.default_type().is_none());
    }

    #[test]
    fn serialized_form_round_trips() {
        let iface = InterfaceConfig::from_parts("tags", Some(json!({"presets": ["a"]}))).unwrap();
        let value = serde_json::to_value(&iface).unwrap();
        assert_eq!(value["interface"], "tags");
        let back: InterfaceConfig = serde_json::from_value(value).unwrap();
        assert_eq!(back, iface);
    }

    #[test]
    fn display_type_sets() {
        let display = DisplayConfig::from_parts("boolean", None).unwrap();
        assert_eq!(display.supported_types(), &[DataType::Boolean]);
        assert!(DisplayConfig::from_parts("raw", None)
            .unwrap()
            .supported_types()
            .contains(&DataType::Json));
    }
}
