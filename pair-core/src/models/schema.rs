// pair-core/src/models/schema.rs
use serde_json::{json, Map, Value as JsonValue};

/// The type of a single schema field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    /// A list whose items all have the given type.
    Array(Box<FieldType>),
    /// A string-keyed map whose values all have the given type.
    Map(Box<FieldType>),
    /// A nested object described by its own schema.
    Object(Box<Schema>),
}

impl FieldType {
    pub fn array(items: FieldType) -> Self {
        FieldType::Array(Box::new(items))
    }

    pub fn map(values: FieldType) -> Self {
        FieldType::Map(Box::new(values))
    }

    pub fn object(schema: Schema) -> Self {
        FieldType::Object(Box::new(schema))
    }

    fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Array(_) => "array",
            FieldType::Map(_) | FieldType::Object(_) => "object",
        }
    }

    fn to_json_schema(&self) -> JsonValue {
        match self {
            FieldType::Array(items) => json!({ "type": "array", "items": items.to_json_schema() }),
            FieldType::Map(values) => {
                json!({ "type": "object", "additionalProperties": values.to_json_schema() })
            }
            FieldType::Object(schema) => schema.to_json_schema(),
            scalar => json!({ "type": scalar.name() }),
        }
    }

    fn check(&self, path: &str, value: &JsonValue, errors: &mut Vec<String>) {
        match (self, value) {
            (FieldType::String, JsonValue::String(_)) => {}
            (FieldType::Boolean, JsonValue::Bool(_)) => {}
            (FieldType::Number, JsonValue::Number(_)) => {}
            (FieldType::Integer, JsonValue::Number(n)) if n.is_i64() || n.is_u64() => {}
            (FieldType::Array(items), JsonValue::Array(values)) => {
                for (index, item) in values.iter().enumerate() {
                    items.check(&format!("{}.{}", path, index), item, errors);
                }
            }
            (FieldType::Map(values), JsonValue::Object(map)) => {
                for (key, item) in map {
                    values.check(&format!("{}.{}", path, key), item, errors);
                }
            }
            (FieldType::Object(schema), JsonValue::Object(map)) => {
                schema.check_object(Some(path), map, errors);
            }
            (expected, found) => errors.push(format!(
                "{}: expected {}, found {}",
                path,
                expected.name(),
                json_type_name(found)
            )),
        }
    }
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(n) if n.is_i64() || n.is_u64() => "integer",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// Defines a single field within a [`Schema`].
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaField {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub description: String,
}

/// A data-described target shape: it renders the instruction shown to the model and
/// validates what comes back.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub name: String,
    pub description: Option<String>,
    pub fields: Vec<SchemaField>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a required field.
    pub fn field(
        mut self,
        name: impl Into<String>,
        field_type: FieldType,
        description: impl Into<String>,
    ) -> Self {
        self.fields.push(SchemaField {
            name: name.into(),
            field_type,
            required: true,
            description: description.into(),
        });
        self
    }

    /// Adds a field that may be absent or null.
    pub fn optional_field(
        mut self,
        name: impl Into<String>,
        field_type: FieldType,
        description: impl Into<String>,
    ) -> Self {
        self.fields.push(SchemaField {
            name: name.into(),
            field_type,
            required: false,
            description: description.into(),
        });
        self
    }

    /// Renders the schema as a JSON Schema object.
    pub fn to_json_schema(&self) -> JsonValue {
        let mut properties = Map::new();
        for field in &self.fields {
            let mut property = field.field_type.to_json_schema();
            if let JsonValue::Object(map) = &mut property {
                map.insert("description".to_string(), json!(field.description));
            }
            properties.insert(field.name.clone(), property);
        }
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();

        let mut schema = json!({
            "title": self.name,
            "type": "object",
            "properties": properties,
            "required": required,
        });
        if let Some(description) = &self.description {
            schema["description"] = json!(description);
        }
        schema
    }

    /// The system instruction asking the model for raw data matching this schema.
    pub fn instruction(&self) -> String {
        format!(
            "Please respond ONLY with valid json that conforms to this json_schema: {}. \
             Do not include additional text other than the object json as we will load \
             this object with a json parser and validate it against the schema.",
            self.to_json_schema()
        )
    }

    /// Checks required fields and types. Unknown fields are ignored.
    ///
    /// On failure returns one message per problem, each prefixed with the field path.
    pub fn validate(&self, value: &JsonValue) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        match value {
            JsonValue::Object(map) => self.check_object(None, map, &mut errors),
            other => errors.push(format!(
                "{}: expected object, found {}",
                self.name,
                json_type_name(other)
            )),
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Like [`Schema::validate`] but folds the problems into one diagnostic string.
    pub fn validate_report(&self, value: &JsonValue) -> Result<(), String> {
        self.validate(value).map_err(|errors| {
            let mut report = format!(
                "{} validation error{} for {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                self.name
            );
            for error in errors {
                report.push_str("\n  ");
                report.push_str(&error);
            }
            report
        })
    }

    fn check_object(
        &self,
        prefix: Option<&str>,
        map: &Map<String, JsonValue>,
        errors: &mut Vec<String>,
    ) {
        for field in &self.fields {
            let path = match prefix {
                Some(prefix) => format!("{}.{}", prefix, field.name),
                None => field.name.clone(),
            };
            match map.get(&field.name) {
                None | Some(JsonValue::Null) if field.required => {
                    errors.push(format!("{}: field required", path));
                }
                None | Some(JsonValue::Null) => {}
                Some(value) => field.field_type.check(&path, value, errors),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_schema() -> Schema {
        Schema::new("Task")
            .with_description("A unit of work")
            .field("description", FieldType::String, "What to do")
            .field("filenames", FieldType::array(FieldType::String), "Files to read")
            .field("step", FieldType::Integer, "Steps taken so far")
            .optional_field("notes", FieldType::String, "Anything worth remembering")
            .optional_field(
                "read_files",
                FieldType::map(FieldType::String),
                "Contents of files just read",
            )
    }

    #[test]
    fn test_valid_value_passes() {
        let value = json!({
            "description": "summarise",
            "filenames": ["a.rs", "b.rs"],
            "step": 2,
            "notes": null,
            "extra": true
        });
        assert_eq!(task_schema().validate(&value), Ok(()));
    }

    #[test]
    fn test_missing_required_and_wrong_types_are_reported() {
        let value = json!({
            "filenames": ["a.rs", 3],
            "step": 1.5,
            "read_files": { "a.rs": false }
        });
        let errors = task_schema().validate(&value).unwrap_err();
        assert_eq!(
            errors,
            vec![
                "description: field required".to_string(),
                "filenames.1: expected string, found integer".to_string(),
                "step: expected integer, found number".to_string(),
                "read_files.a.rs: expected string, found boolean".to_string(),
            ]
        );
    }

    #[test]
    fn test_non_object_is_rejected() {
        let errors = task_schema().validate(&json!(["a"])).unwrap_err();
        assert_eq!(errors, vec!["Task: expected object, found array".to_string()]);
    }

    #[test]
    fn test_nested_object_paths() {
        let schema = Schema::new("NextStep").optional_field(
            "create_file",
            FieldType::object(
                Schema::new("CreateFile")
                    .field("filename", FieldType::String, "Name")
                    .field("content", FieldType::String, "Body"),
            ),
            "A file to create",
        );
        let errors = schema
            .validate(&json!({ "create_file": { "filename": "x.py" } }))
            .unwrap_err();
        assert_eq!(errors, vec!["create_file.content: field required".to_string()]);
    }

    #[test]
    fn test_report_counts_errors() {
        let report = task_schema().validate_report(&json!({})).unwrap_err();
        assert!(report.starts_with("3 validation errors for Task"), "{}", report);
        assert!(report.contains("step: field required"));
    }

    #[test]
    fn test_json_schema_rendering() {
        let rendered = task_schema().to_json_schema();
        assert_eq!(rendered["title"], "Task");
        assert_eq!(rendered["type"], "object");
        assert_eq!(rendered["description"], "A unit of work");
        assert_eq!(rendered["properties"]["filenames"]["type"], "array");
        assert_eq!(rendered["properties"]["filenames"]["items"]["type"], "string");
        assert_eq!(rendered["properties"]["step"]["description"], "Steps taken so far");
        assert_eq!(
            rendered["properties"]["read_files"]["additionalProperties"]["type"],
            "string"
        );
        assert_eq!(rendered["required"], json!(["description", "filenames", "step"]));
    }

    #[test]
    fn test_instruction_embeds_schema() {
        let instruction = task_schema().instruction();
        assert!(instruction.starts_with("Please respond ONLY with valid json"));
        assert!(instruction.contains("\"title\":\"Task\""));
    }
}
