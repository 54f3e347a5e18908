//! Form and list field types reported in page metadata

use loom_orm::{FieldDescriptor, FieldType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Input widget type of a field in create and update forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormFieldType {
    Boolean,
    Date,
    Datetime,
    Time,
    Email,
    File,
    Number,
    Password,
    Telephone,
    String,
    Text,
    Url,
    Uuid,
    Ipv4,
    Ipv6,
    Object,
}

/// Display type of a column in find results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListFieldType {
    Boolean,
    Date,
    Datetime,
    Time,
    String,
}

impl FormFieldType {
    /// Form type of a schema field. Names hint at string subtypes.
    pub fn for_field(field: &FieldDescriptor) -> Self {
        match field.field_type {
            FieldType::Integer | FieldType::Float => FormFieldType::Number,
            FieldType::Boolean => FormFieldType::Boolean,
            FieldType::Date => FormFieldType::Date,
            FieldType::Time => FormFieldType::Time,
            FieldType::DateTime => FormFieldType::Datetime,
            FieldType::Uuid => FormFieldType::Uuid,
            FieldType::Json => FormFieldType::Object,
            FieldType::Text => FormFieldType::Text,
            FieldType::String => {
                let name = field.name.to_lowercase();
                if name.contains("password") {
                    FormFieldType::Password
                } else if name.contains("email") {
                    FormFieldType::Email
                } else if name.ends_with("url") {
                    FormFieldType::Url
                } else if name.contains("phone") {
                    FormFieldType::Telephone
                } else {
                    FormFieldType::String
                }
            }
        }
    }

    /// List type used to display values of this form type.
    pub fn list_type(self) -> ListFieldType {
        match self {
            FormFieldType::Boolean => ListFieldType::Boolean,
            FormFieldType::Date => ListFieldType::Date,
            FormFieldType::Datetime => ListFieldType::Datetime,
            FormFieldType::Time => ListFieldType::Time,
            _ => ListFieldType::String,
        }
    }
}

impl fmt::Display for FormFieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = serde_json::to_value(self).map_err(|_| fmt::Error)?;
        write!(f, "{}", value.as_str().unwrap_or_default())
    }
}

impl fmt::Display for ListFieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = serde_json::to_value(self).map_err(|_| fmt::Error)?;
        write!(f, "{}", value.as_str().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_orm::FieldDescriptor;

    #[test]
    fn test_form_type_from_field() {
        let email = FieldDescriptor::column("email", FieldType::String);
        assert_eq!(FormFieldType::for_field(&email), FormFieldType::Email);
        let count = FieldDescriptor::column("count", FieldType::Integer);
        assert_eq!(FormFieldType::for_field(&count), FormFieldType::Number);
        let body = FieldDescriptor::column("body", FieldType::Text);
        assert_eq!(FormFieldType::for_field(&body), FormFieldType::Text);
    }

    #[test]
    fn test_list_type_map() {
        assert_eq!(FormFieldType::Boolean.list_type(), ListFieldType::Boolean);
        assert_eq!(FormFieldType::Datetime.list_type(), ListFieldType::Datetime);
        for form in [
            FormFieldType::Email,
            FormFieldType::Number,
            FormFieldType::Password,
            FormFieldType::Uuid,
            FormFieldType::Ipv6,
            FormFieldType::Object,
        ] {
            assert_eq!(form.list_type(), ListFieldType::String);
        }
        assert_eq!(FormFieldType::Datetime.to_string(), "datetime");
    }
}
