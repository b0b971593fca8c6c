// Design Prompt Templates
// Primary, fallback, and static content builders per design domain

use schemaflow_types::DesignDomain;

// ============================================================================
// Prompt Templates
// ============================================================================

/// Prompt builder for the design generation paths
pub struct DesignPrompts;

impl DesignPrompts {
    /// Full multi-phase prompt used by the primary path
    pub fn primary(request: &str, domain: DesignDomain) -> String {
        format!(
            r#"You are a senior database architect designing a {domain} data store.

## Request
{request}

## Instructions
Work through the design in clearly separated phases:

1. **Requirements Analysis**: entities, relationships, access patterns,
   expected volumes, consistency needs.
2. **Schema Design**: the concrete {schema_artifact}, with every field
   typed and every index justified.
3. **Implementation Plan**: migration steps and example statements to
   create the store.
4. **Validation**: edge cases, integrity constraints, and how to verify
   the design holds under the stated access patterns.

Use fenced code blocks for all {schema_artifact} definitions. Be concrete;
no placeholders."#,
            domain = domain.as_str(),
            request = request,
            schema_artifact = Self::schema_artifact(domain),
        )
    }

    /// Deliberately smaller request shape used once the primary path is
    /// exhausted. One phase, no multi-step structure, minimal output.
    pub fn fallback(request: &str, domain: DesignDomain) -> String {
        format!(
            r#"Design a {domain} data store for the following requirement.
Output only the {schema_artifact} in a single fenced code block, followed by
one short paragraph of rationale.

Requirement: {request}"#,
            domain = domain.as_str(),
            request = request,
            schema_artifact = Self::schema_artifact(domain),
        )
    }

    /// Single-shot prompt for the quick, cached client
    pub fn quick(request: &str, domain: DesignDomain) -> String {
        format!(
            "Produce a complete {} schema for: {}\nUse fenced code blocks and end with a one-line summary.",
            domain.as_str(),
            request
        )
    }

    fn schema_artifact(domain: DesignDomain) -> &'static str {
        match domain {
            DesignDomain::Relational => "SQL DDL",
            DesignDomain::Document => "collection schemas",
            DesignDomain::Vector => "index and embedding configuration",
        }
    }
}

// ============================================================================
// Static content
// ============================================================================

/// Last-resort, network-independent content. Deterministic per domain.
pub struct StaticContent;

impl StaticContent {
    pub fn analysis(request: &str, domain: DesignDomain) -> String {
        format!(
            r#"## Requirements Analysis

Target store: {domain}.

Requested system: {request}

Key considerations for a {domain} design:
{considerations}

This analysis was produced offline; refine entity volumes and access
patterns once connectivity is restored."#,
            domain = domain.as_str(),
            request = request,
            considerations = Self::considerations(domain),
        )
    }

    pub fn design(domain: DesignDomain) -> String {
        match domain {
            DesignDomain::Relational => r#"## Schema Design

```sql
CREATE TABLE entities (
    id          BIGSERIAL PRIMARY KEY,
    name        TEXT NOT NULL,
    attributes  JSONB NOT NULL DEFAULT '{}',
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE relationships (
    id          BIGSERIAL PRIMARY KEY,
    source_id   BIGINT NOT NULL REFERENCES entities(id),
    target_id   BIGINT NOT NULL REFERENCES entities(id),
    kind        TEXT NOT NULL,
    UNIQUE (source_id, target_id, kind)
);

CREATE INDEX idx_entities_name ON entities (name);
```

A generic entity-relationship starting point: normalize attributes out of
the JSONB column as access patterns become clear."#
                .to_string(),
            DesignDomain::Document => r#"## Schema Design

```json
{
  "collections": {
    "entities": {
      "fields": {
        "_id": "ObjectId",
        "name": "string",
        "attributes": "object",
        "createdAt": "date"
      },
      "indexes": [{ "name": 1 }]
    },
    "relationships": {
      "fields": {
        "_id": "ObjectId",
        "sourceId": "ObjectId",
        "targetId": "ObjectId",
        "kind": "string"
      },
      "indexes": [{ "sourceId": 1, "kind": 1 }]
    }
  }
}
```

Embed relationship documents into entities only if they are read together
and stay small."#
                .to_string(),
            DesignDomain::Vector => r#"## Schema Design

```yaml
index:
  name: entities
  dimension: 1536
  metric: cosine
  payload_fields:
    name: keyword
    attributes: object
    created_at: datetime
```

Store raw documents alongside their embeddings; re-embed on any change to
the source text."#
                .to_string(),
        }
    }

    fn considerations(domain: DesignDomain) -> &'static str {
        match domain {
            DesignDomain::Relational => {
                "- Normalize to third normal form first, denormalize only against measured hotspots.\n\
                 - Foreign keys on every relationship; composite indexes follow query shapes.\n\
                 - Plan migrations as forward-only, reversible scripts."
            }
            DesignDomain::Document => {
                "- Model around access patterns, not entities; embed what is read together.\n\
                 - Keep documents under the storage engine's size limits.\n\
                 - Index the fields used in filters and sorts, nothing more."
            }
            DesignDomain::Vector => {
                "- Choose the embedding dimension and distance metric up front; both are costly to change.\n\
                 - Keep scalar payload fields for filtering next to each vector.\n\
                 - Batch upserts and schedule re-embedding on source updates."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_prompt_names_the_domain_artifact() {
        let prompt = DesignPrompts::primary("inventory tracker", DesignDomain::Relational);
        assert!(prompt.contains("SQL DDL"));
        assert!(prompt.contains("inventory tracker"));
    }

    #[test]
    fn fallback_prompt_is_smaller_than_primary() {
        let primary = DesignPrompts::primary("inventory tracker", DesignDomain::Document);
        let fallback = DesignPrompts::fallback("inventory tracker", DesignDomain::Document);
        assert!(fallback.len() < primary.len());
    }

    #[test]
    fn static_design_is_deterministic() {
        assert_eq!(
            StaticContent::design(DesignDomain::Vector),
            StaticContent::design(DesignDomain::Vector)
        );
        assert!(StaticContent::design(DesignDomain::Relational).contains("```sql"));
    }
}
