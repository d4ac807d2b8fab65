use serde_json::{Map, Value};

use super::defaults;
use crate::core::errors::KnowledgeError;

pub fn validate_config(config: &Value) -> Result<(), KnowledgeError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(chunking) = expect_optional_object(root, "chunking")? {
        validate_u64_field(
            chunking,
            "chunking.chunk_size",
            "chunk_size",
            1,
            defaults::MAX_CHUNK_SIZE,
        )?;
        validate_u64_field(
            chunking,
            "chunking.chunk_overlap",
            "chunk_overlap",
            0,
            defaults::MAX_CHUNK_SIZE,
        )?;

        let size = chunking
            .get("chunk_size")
            .and_then(Value::as_u64)
            .unwrap_or(defaults::CHUNK_SIZE as u64);
        let overlap = chunking
            .get("chunk_overlap")
            .and_then(Value::as_u64)
            .unwrap_or(defaults::CHUNK_OVERLAP as u64);
        if overlap >= size {
            return Err(KnowledgeError::InvalidConfig(format!(
                "'chunking.chunk_overlap' ({}) must be smaller than 'chunking.chunk_size' ({})",
                overlap, size
            )));
        }
    }

    if let Some(storage) = expect_optional_object(root, "storage")? {
        validate_enum_field(storage, "storage.backend", "backend", &["memory", "sqlite"])?;
        validate_bool_field(storage, "storage.reload_on_start", "reload_on_start")?;
    }

    if let Some(embedding) = expect_optional_object(root, "embedding")? {
        validate_optional_string_field(embedding, "embedding.base_url", "base_url")?;
        validate_optional_string_field(embedding, "embedding.model", "model")?;
        validate_optional_string_field(embedding, "embedding.api_key", "api_key")?;
        validate_u64_field(
            embedding,
            "embedding.timeout_secs",
            "timeout_secs",
            1,
            86_400,
        )?;
        validate_u64_field(
            embedding,
            "embedding.concurrency",
            "concurrency",
            1,
            defaults::MAX_EMBEDDING_CONCURRENCY,
        )?;
        validate_bool_field(embedding, "embedding.cache", "cache")?;
    }

    if let Some(search) = expect_optional_object(root, "search")? {
        validate_u64_field(
            search,
            "search.default_top_k",
            "default_top_k",
            1,
            defaults::MAX_TOP_K,
        )?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, KnowledgeError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(config_type_error(key, "object")),
        None => Ok(None),
    }
}

fn validate_bool_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), KnowledgeError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_bool().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "boolean"))
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), KnowledgeError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(KnowledgeError::InvalidConfig(format!(
            "'{}' must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), KnowledgeError> {
    match section.get(key) {
        None | Some(Value::Null) | Some(Value::String(_)) => Ok(()),
        Some(_) => Err(config_type_error(path, "string")),
    }
}

fn validate_enum_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    allowed: &[&str],
) -> Result<(), KnowledgeError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if allowed.contains(&text) {
        return Ok(());
    }
    Err(KnowledgeError::InvalidConfig(format!(
        "'{}' must be one of: {}",
        path,
        allowed.join(", ")
    )))
}

fn config_type_error(path: &str, expected: &str) -> KnowledgeError {
    KnowledgeError::InvalidConfig(format!("'{}' must be of type {}", path, expected))
}
