//! Arrow schema for the LanceDB message vector table.
//!
//! Arrow versions MUST match lancedb's transitive dependency (57.3 for lancedb 0.26).

use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema};

/// Name of the table holding one row per embedded message.
pub const MESSAGE_VECTORS_TABLE: &str = "message_vectors";

/// Schema for the `message_vectors` table.
///
/// Only ids, participants and the vector live here; message text stays in
/// SQLite. `dimension` must match the embedding model.
pub fn message_vectors_schema(dimension: i32) -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("sender_id", DataType::Int64, false),
        Field::new("receiver_id", DataType::Int64, false),
        Field::new("created_at", DataType::Utf8, false),
        Field::new("embedding_model", DataType::Utf8, false),
        Field::new("vector", vector_type(dimension), false),
    ])
}

pub fn vector_type(dimension: i32) -> DataType {
    DataType::FixedSizeList(
        Arc::new(Field::new("item", DataType::Float32, true)),
        dimension,
    )
}

/// Vector width declared by `schema`, if it has a fixed-size `vector` column.
pub fn vector_dimension(schema: &Schema) -> Option<i32> {
    match schema.field_with_name("vector").ok()?.data_type() {
        DataType::FixedSizeList(_, size) => Some(*size),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_vectors_schema_fields() {
        let schema = message_vectors_schema(384);
        assert_eq!(schema.fields().len(), 6);
        assert!(schema.field_with_name("id").is_ok());
        assert!(schema.field_with_name("sender_id").is_ok());
        assert!(schema.field_with_name("receiver_id").is_ok());
        assert_eq!(vector_dimension(&schema), Some(384));
    }

    #[test]
    fn test_vector_dimension_missing_column() {
        let schema = Schema::new(vec![Field::new("id", DataType::Int64, false)]);
        assert_eq!(vector_dimension(&schema), None);
    }
}
