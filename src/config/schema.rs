use serde_json::{json, Value};
use std::sync::LazyLock;

pub static CONFIG_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "crawl": {
                "type": "object",
                "properties": {
                    "max_depth": { "type": "integer", "minimum": 0 },
                    "max_pages": { "type": "integer", "minimum": 1 },
                    "excluded_patterns": { "type": "array", "items": { "type": "string" } },
                    "sitemap_timeout_secs": { "type": "integer", "minimum": 1 },
                    "navigation_timeout_ms": { "type": "integer", "minimum": 1 }
                }
            },
            "browser": {
                "type": "object",
                "properties": {
                    "viewport_width": { "type": "integer", "minimum": 1 },
                    "viewport_height": { "type": "integer", "minimum": 1 },
                    "page_timeout_ms": { "type": "integer", "minimum": 1 },
                    "idle_settle_ms": { "type": "integer", "minimum": 0 },
                    "retry_attempts": { "type": "integer", "minimum": 0, "maximum": 5 },
                    "node_binary": { "type": "string" },
                    "headless": { "type": "boolean" },
                    "js_error_window_ms": { "type": "integer", "minimum": 0 }
                }
            },
            "forms": {
                "type": "object",
                "properties": {
                    "success_keywords": { "type": "array", "items": { "type": "string" } },
                    "error_keywords": { "type": "array", "items": { "type": "string" } },
                    "submit_timeout_ms": { "type": "integer", "minimum": 1 },
                    "test_data": {
                        "type": "object",
                        "properties": {
                            "email": { "type": "string" },
                            "name": { "type": "string" },
                            "first_name": { "type": "string" },
                            "last_name": { "type": "string" },
                            "message": { "type": "string" },
                            "phone": { "type": "string" },
                            "company": { "type": "string" },
                            "text": { "type": "string" }
                        }
                    }
                }
            },
            "links": {
                "type": "object",
                "properties": {
                    "timeout_secs": { "type": "integer", "minimum": 1 },
                    "max_redirects": { "type": "integer", "minimum": 0 },
                    "concurrency": { "type": "integer", "minimum": 1 }
                }
            },
            "visual": {
                "type": "object",
                "properties": {
                    "diff_threshold_percentage": { "type": "number", "minimum": 0, "maximum": 100 },
                    "pixel_threshold": { "type": "number", "minimum": 0, "maximum": 1 },
                    "auto_baseline": { "type": "boolean" }
                }
            },
            "output": {
                "type": "object",
                "properties": {
                    "screenshot_dir": { "type": "string" },
                    "database": { "type": "string" }
                }
            },
            "figma": {
                "type": "object",
                "properties": {
                    "access_token": { "type": "string" },
                    "api_base": { "type": "string", "format": "uri" }
                }
            }
        }
    })
});
