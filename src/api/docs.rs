//! Swagger UI and the OpenAPI document, mounted in development only.

use axum::response::{Html, Json};
use serde_json::{json, Map, Value};

pub const OPENAPI_PATH: &str = "/v2/inventory/docs/openapi.json";

pub async fn get_api_docs() -> Html<String> {
    let html = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Inventory API Documentation</title>
    <link rel="stylesheet" type="text/css" href="https://unpkg.com/swagger-ui-dist@5.9.0/swagger-ui.css" />
    <style>
        html {
            box-sizing: border-box;
            overflow-y: scroll;
        }
        *, *:before, *:after {
            box-sizing: inherit;
        }
        body {
            margin: 0;
            background: #fafafa;
        }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5.9.0/swagger-ui-bundle.js"></script>
    <script src="https://unpkg.com/swagger-ui-dist@5.9.0/swagger-ui-standalone-preset.js"></script>
    <script>
        window.onload = function() {
            const ui = SwaggerUIBundle({
                url: '__OPENAPI_PATH__',
                dom_id: '#swagger-ui',
                deepLinking: true,
                presets: [
                    SwaggerUIBundle.presets.apis,
                    SwaggerUIStandalonePreset
                ],
                plugins: [
                    SwaggerUIBundle.plugins.DownloadUrl
                ],
                layout: "StandaloneLayout"
            });
        };
    </script>
</body>
</html>
"#;
    Html(html.replace("__OPENAPI_PATH__", OPENAPI_PATH))
}

pub async fn get_openapi_spec() -> Json<Value> {
    Json(openapi_document())
}

fn page_parameters() -> Vec<Value> {
    vec![
        json!({"name": "sortBy", "in": "query", "schema": {"type": "string"}, "description": "field:asc|desc, comma separated"}),
        json!({"name": "limit", "in": "query", "schema": {"type": "integer", "minimum": 1}}),
        json!({"name": "page", "in": "query", "schema": {"type": "integer", "minimum": 1}}),
    ]
}

fn query_parameters(names: &[&str]) -> Vec<Value> {
    names
        .iter()
        .map(|name| json!({"name": name, "in": "query", "schema": {"type": "string"}}))
        .chain(page_parameters())
        .collect()
}

fn error_response(description: &str) -> Value {
    json!({
        "description": description,
        "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Error"}}}
    })
}

fn json_response(description: &str, schema: Value) -> Value {
    json!({
        "description": description,
        "content": {"application/json": {"schema": schema}}
    })
}

/// Collection and item paths for one REST resource
fn resource_paths(
    paths: &mut Map<String, Value>,
    resource: &str,
    tag: &str,
    model: &str,
    filters: &[&str],
) {
    let model_ref = json!({"$ref": format!("#/components/schemas/{}", model)});
    let create_ref = json!({"$ref": format!("#/components/schemas/New{}", model)});
    let update_ref = json!({"$ref": format!("#/components/schemas/{}Update", model)});
    let id_param = json!({"name": "id", "in": "path", "required": true, "schema": {"type": "string"}});

    paths.insert(
        format!("/v2/inventory/{}", resource),
        json!({
            "post": {
                "tags": [tag],
                "summary": format!("Create a {}", tag.to_lowercase()),
                "security": [{"userId": []}],
                "requestBody": {"required": true, "content": {"application/json": {"schema": create_ref}}},
                "responses": {
                    "201": json_response("Created", model_ref.clone()),
                    "400": error_response("Invalid request"),
                    "401": error_response("Missing x-user-id header")
                }
            },
            "get": {
                "tags": [tag],
                "summary": format!("List {}", resource),
                "parameters": query_parameters(filters),
                "responses": {
                    "200": json_response("One page of results", json!({
                        "allOf": [{"$ref": "#/components/schemas/Page"}],
                        "properties": {"results": {"type": "array", "items": model_ref}}
                    })),
                    "400": error_response("Invalid query")
                }
            }
        }),
    );

    paths.insert(
        format!("/v2/inventory/{}/{{id}}", resource),
        json!({
            "get": {
                "tags": [tag],
                "parameters": [id_param],
                "responses": {
                    "200": json_response("Found", model_ref.clone()),
                    "404": error_response("Not found")
                }
            },
            "patch": {
                "tags": [tag],
                "security": [{"userId": []}],
                "parameters": [id_param],
                "requestBody": {"required": true, "content": {"application/json": {"schema": update_ref}}},
                "responses": {
                    "200": json_response("Updated", model_ref),
                    "400": error_response("Invalid request"),
                    "403": error_response("Caller may not modify this entity"),
                    "404": error_response("Not found")
                }
            },
            "delete": {
                "tags": [tag],
                "security": [{"userId": []}],
                "parameters": [id_param],
                "responses": {
                    "204": {"description": "Deleted"},
                    "403": error_response("Caller may not modify this entity"),
                    "404": error_response("Not found")
                }
            }
        }),
    );
}

fn component_schemas() -> Value {
    let cardinality = json!({
        "type": "string",
        "nullable": true,
        "enum": ["one-to-one", "zero-to-one", "one-to-many", "zero-to-many"]
    });

    json!({
        "Error": {
            "type": "object",
            "properties": {"code": {"type": "integer"}, "message": {"type": "string"}}
        },
        "Page": {
            "type": "object",
            "properties": {
                "results": {"type": "array", "items": {}},
                "page": {"type": "integer"},
                "limit": {"type": "integer"},
                "totalPages": {"type": "integer"},
                "totalResults": {"type": "integer"}
            }
        },
        "Schema": {
            "type": "object",
            "properties": {
                "id": {"type": "string"},
                "name": {"type": "string"},
                "description": {"type": "string"},
                "schema_definition": {"type": "object"},
                "created_by": {"type": "object"},
                "createdAt": {"type": "string", "format": "date-time"},
                "updatedAt": {"type": "string", "format": "date-time"}
            }
        },
        "NewSchema": {
            "type": "object",
            "required": ["name", "schema_definition"],
            "properties": {
                "name": {"type": "string"},
                "description": {"type": "string"},
                "schema_definition": {"type": "string", "description": "JSON Schema document, serialized"}
            }
        },
        "SchemaUpdate": {
            "type": "object",
            "minProperties": 1,
            "properties": {
                "name": {"type": "string"},
                "description": {"type": "string"},
                "schema_definition": {"type": "string"}
            }
        },
        "Instance": {
            "type": "object",
            "properties": {
                "id": {"type": "string"},
                "name": {"type": "string"},
                "schema": {"type": "object"},
                "data": {"type": "object"},
                "created_by": {"type": "object"},
                "createdAt": {"type": "string", "format": "date-time"},
                "updatedAt": {"type": "string", "format": "date-time"}
            }
        },
        "NewInstance": {
            "type": "object",
            "required": ["name", "schema", "data"],
            "properties": {
                "name": {"type": "string"},
                "schema": {"type": "string"},
                "data": {"type": "string", "description": "Instance data, serialized JSON"}
            }
        },
        "InstanceUpdate": {
            "type": "object",
            "minProperties": 1,
            "properties": {"name": {"type": "string"}, "data": {"type": "string"}}
        },
        "Relation": {
            "type": "object",
            "properties": {
                "id": {"type": "string"},
                "name": {"type": "string"},
                "type": {"type": "string"},
                "description": {"type": "string"},
                "source": {"type": "object"},
                "target": {"type": "object"},
                "source_cardinality": cardinality,
                "target_cardinality": cardinality,
                "source_role_name": {"type": "string"},
                "target_role_name": {"type": "string"},
                "is_core": {"type": "boolean"},
                "metadata": {"type": "object"},
                "created_by": {"type": "object"}
            }
        },
        "NewRelation": {
            "type": "object",
            "required": ["name", "source", "target"],
            "properties": {
                "name": {"type": "string"},
                "type": {"type": "string", "default": "custom"},
                "description": {"type": "string"},
                "source": {"type": "string"},
                "target": {"type": "string"},
                "source_cardinality": cardinality,
                "target_cardinality": cardinality,
                "source_role_name": {"type": "string"},
                "target_role_name": {"type": "string"},
                "is_core": {"type": "boolean", "default": false},
                "metadata": {"type": "object"}
            }
        },
        "RelationUpdate": {
            "type": "object",
            "minProperties": 1,
            "properties": {
                "name": {"type": "string"},
                "description": {"type": "string"},
                "source_cardinality": cardinality,
                "target_cardinality": cardinality,
                "source_role_name": {"type": "string"},
                "target_role_name": {"type": "string"},
                "is_core": {"type": "boolean"},
                "metadata": {"type": "object"}
            }
        },
        "InstanceRelation": {
            "type": "object",
            "properties": {
                "id": {"type": "string"},
                "relation": {"type": "object"},
                "source": {"type": "object"},
                "target": {"type": "object"},
                "metadata": {"type": "object"},
                "description": {"type": "string"},
                "created_by": {"type": "object"}
            }
        },
        "NewInstanceRelation": {
            "type": "object",
            "required": ["relation", "source", "target"],
            "properties": {
                "relation": {"type": "string"},
                "source": {"type": "string"},
                "target": {"type": "string"},
                "metadata": {"type": "object"},
                "description": {"type": "string"}
            }
        },
        "InstanceRelationUpdate": {
            "type": "object",
            "required": ["metadata"],
            "properties": {"metadata": {"type": "object"}, "description": {"type": "string"}}
        },
        "ChangeLog": {
            "type": "object",
            "properties": {
                "id": {"type": "string"},
                "ref_type": {"type": "string"},
                "ref": {"type": "string"},
                "action": {"type": "string", "enum": ["CREATE", "UPDATE", "DELETE"]},
                "created_by": {"type": "string"},
                "description": {"type": "string"},
                "createdAt": {"type": "string", "format": "date-time"},
                "updatedAt": {"type": "string", "format": "date-time"}
            }
        }
    })
}

pub fn openapi_document() -> Value {
    let mut paths = Map::new();
    resource_paths(&mut paths, "schemas", "Schemas", "Schema", &["name", "created_by", "search"]);
    resource_paths(
        &mut paths,
        "instances",
        "Instances",
        "Instance",
        &["name", "schema", "created_by", "search"],
    );
    resource_paths(
        &mut paths,
        "relations",
        "Relations",
        "Relation",
        &[
            "name",
            "type",
            "source",
            "target",
            "source_cardinality",
            "target_cardinality",
            "source_role_name",
            "target_role_name",
            "is_core",
            "created_by",
            "search",
        ],
    );
    resource_paths(
        &mut paths,
        "instance-relations",
        "InstanceRelations",
        "InstanceRelation",
        &["relation", "source", "target"],
    );

    paths.insert(
        "/v2/inventory/change-logs".to_string(),
        json!({
            "get": {
                "tags": ["ChangeLogs"],
                "summary": "List change log entries (admin only)",
                "security": [{"userId": []}],
                "parameters": query_parameters(&[
                    "created_by", "ref", "ref_type", "action", "search", "createdAt", "updatedAt"
                ]),
                "responses": {
                    "200": json_response("One page of results", json!({
                        "allOf": [{"$ref": "#/components/schemas/Page"}],
                        "properties": {"results": {"type": "array", "items": {"$ref": "#/components/schemas/ChangeLog"}}}
                    })),
                    "400": error_response("Invalid query"),
                    "401": error_response("Missing x-user-id header"),
                    "403": error_response("Caller is not an admin")
                }
            }
        }),
    );

    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "Inventory API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Schemas, instances, typed relations between schemas and the concrete links between instances."
        },
        "servers": [{"url": "/", "description": "Current server"}],
        "paths": paths,
        "components": {
            "schemas": component_schemas(),
            "securitySchemes": {
                "userId": {"type": "apiKey", "in": "header", "name": "x-user-id"}
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_every_resource() {
        let doc = openapi_document();
        for path in [
            "/v2/inventory/schemas",
            "/v2/inventory/schemas/{id}",
            "/v2/inventory/instances/{id}",
            "/v2/inventory/relations",
            "/v2/inventory/instance-relations/{id}",
            "/v2/inventory/change-logs",
        ] {
            assert!(doc["paths"].get(path).is_some(), "missing {}", path);
        }
        assert_eq!(
            doc["paths"]["/v2/inventory/schemas"]["post"]["responses"]["201"]["content"]
                ["application/json"]["schema"]["$ref"],
            "#/components/schemas/Schema"
        );
    }
}
