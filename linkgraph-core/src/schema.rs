// Field schemas for indexed document records and graph output tables

use arrow_schema::{DataType, Field, Fields, Schema, SchemaRef};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    Int64,
    Float64,
    Utf8,
    List { item: Box<SchemaField> },
    Struct { fields: Vec<SchemaField> },
}

impl FieldType {
    pub fn to_arrow(&self) -> DataType {
        match self {
            FieldType::Int64 => DataType::Int64,
            FieldType::Float64 => DataType::Float64,
            FieldType::Utf8 => DataType::Utf8,
            FieldType::List { item } => DataType::List(Arc::new(item.to_arrow())),
            FieldType::Struct { fields } => DataType::Struct(Fields::from(
                fields.iter().map(SchemaField::to_arrow).collect::<Vec<Field>>(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(flatten)]
    pub data_type: FieldType,
    pub nullable: bool,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, data_type: FieldType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }

    pub fn required(name: impl Into<String>, data_type: FieldType) -> Self {
        Self::new(name, data_type, false)
    }

    pub fn to_arrow(&self) -> Field {
        Field::new(&self.name, self.data_type.to_arrow(), self.nullable)
    }
}

pub fn to_arrow_schema(fields: &[SchemaField]) -> SchemaRef {
    Arc::new(Schema::new(
        fields.iter().map(SchemaField::to_arrow).collect::<Vec<Field>>(),
    ))
}

/// `url` is the one field every indexed record carries.
pub fn document_base_schema() -> Vec<SchemaField> {
    vec![SchemaField::required("url", FieldType::Utf8)]
}

/// `external_links: list<struct<href: utf8 not null>>`, nullable.
pub fn external_links_field() -> SchemaField {
    SchemaField::new(
        "external_links",
        FieldType::List {
            item: Box::new(SchemaField::new(
                "item",
                FieldType::Struct {
                    fields: vec![SchemaField::required("href", FieldType::Utf8)],
                },
                true,
            )),
        },
        true,
    )
}

/// Columns of the `edges` table. The downstream rank job depends on these
/// exact names and types.
pub fn edge_schema(with_weight: bool) -> Vec<SchemaField> {
    let mut fields = vec![
        SchemaField::required("src", FieldType::Int64),
        SchemaField::required("dst", FieldType::Int64),
    ];
    if with_weight {
        fields.push(SchemaField::required("weight", FieldType::Float64));
    }
    fields
}

/// Columns of the `vertices` table.
pub fn vertex_schema() -> Vec<SchemaField> {
    vec![
        SchemaField::required("id", FieldType::Int64),
        SchemaField::required("domain", FieldType::Utf8),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_schema_is_not_nullable() {
        let schema = to_arrow_schema(&edge_schema(false));

        assert_eq!(schema.fields().len(), 2);
        for (field, name) in schema.fields().iter().zip(["src", "dst"]) {
            assert_eq!(field.name(), name);
            assert_eq!(field.data_type(), &DataType::Int64);
            assert!(!field.is_nullable());
        }
    }

    #[test]
    fn test_edge_schema_with_weight() {
        let schema = to_arrow_schema(&edge_schema(true));
        let weight = schema.field_with_name("weight").unwrap();

        assert_eq!(weight.data_type(), &DataType::Float64);
        assert!(!weight.is_nullable());
    }

    #[test]
    fn test_vertex_schema() {
        let schema = to_arrow_schema(&vertex_schema());

        assert_eq!(schema.field(0).name(), "id");
        assert_eq!(schema.field(0).data_type(), &DataType::Int64);
        assert_eq!(schema.field(1).name(), "domain");
        assert_eq!(schema.field(1).data_type(), &DataType::Utf8);
        assert!(schema.fields().iter().all(|f| !f.is_nullable()));
    }

    #[test]
    fn test_external_links_field_to_arrow() {
        let field = external_links_field().to_arrow();

        assert!(field.is_nullable());
        match field.data_type() {
            DataType::List(item) => match item.data_type() {
                DataType::Struct(fields) => {
                    assert_eq!(fields.len(), 1);
                    assert_eq!(fields[0].name(), "href");
                    assert!(!fields[0].is_nullable());
                }
                other => panic!("expected struct item, got {:?}", other),
            },
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn test_schema_json_round_trip() {
        let fields = vec![external_links_field()];
        let json = serde_json::to_string(&fields).unwrap();
        let parsed: Vec<SchemaField> = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, fields);
        assert!(json.contains(r#""type":"list""#));
    }
}
