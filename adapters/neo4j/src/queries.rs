//! Cypher queries for the Neo4j-backed graph store.

pub const CREATE_INDICES: &[&str] = &[
    "CREATE INDEX episode_namespace_idx IF NOT EXISTS FOR (n:Episode) ON (n.namespace)",
    "CREATE INDEX episode_uuid_idx IF NOT EXISTS FOR (n:Episode) ON (n.uuid)",
    "CREATE INDEX entity_namespace_idx IF NOT EXISTS FOR (n:Entity) ON (n.namespace)",
    "CREATE INDEX entity_uuid_idx IF NOT EXISTS FOR (n:Entity) ON (n.uuid)",
    "CREATE INDEX entity_name_idx IF NOT EXISTS FOR (n:Entity) ON (n.name)",
    "CREATE INDEX fact_uuid_idx IF NOT EXISTS FOR ()-[r:FACT]-() ON (r.uuid)",
    "CREATE INDEX fact_namespace_idx IF NOT EXISTS FOR ()-[r:FACT]-() ON (r.namespace)",
];

pub const CREATE_EPISODE: &str = r#"
CREATE (n:Episode {
  uuid: $uuid,
  name: $name,
  body: $body,
  namespace: $namespace,
  created_at: datetime($created_at),
  source_description: $source_description
})
RETURN n.uuid as uuid
"#;

pub const UPSERT_ENTITY_NODE: &str = r#"
MERGE (n:Entity {uuid: $uuid})
ON CREATE SET n.created_at = datetime($created_at)
SET n.name = $name,
    n.summary = $summary,
    n.labels = $labels,
    n.namespace = $namespace,
    n.attributes = $attributes
RETURN n.uuid as uuid
"#;

pub const UPSERT_FACT_EDGE: &str = r#"
MATCH (source:Entity {uuid: $source_uuid})
MATCH (target:Entity {uuid: $target_uuid})
MERGE (source)-[r:FACT {uuid: $uuid}]->(target)
ON CREATE SET r.created_at = datetime($created_at)
SET r.relation = $relation,
    r.fact_text = $fact_text,
    r.valid_from = datetime($valid_from),
    r.invalid_at = CASE WHEN $invalid_at IS NOT NULL THEN datetime($invalid_at) ELSE null END,
    r.namespace = $namespace,
    r.fact_embedding = $fact_embedding
RETURN r.uuid as uuid
"#;

pub const SEARCH_ENTITY_NODES: &str = r#"
MATCH (n:Entity)
WHERE n.namespace IN $namespaces
  AND ($query = '' OR toLower(n.name) CONTAINS toLower($query) OR toLower(n.summary) CONTAINS toLower($query))
  AND ($label_filter IS NULL OR $label_filter IN n.labels)
RETURN n
LIMIT $limit
"#;

pub const SEARCH_FACT_EDGES: &str = r#"
MATCH ()-[r:FACT]->()
WHERE r.namespace IN $namespaces
  AND ($query = '' OR toLower(r.fact_text) CONTAINS toLower($query) OR toLower(r.relation) CONTAINS toLower($query))
RETURN r, startNode(r).uuid as source_uuid, endNode(r).uuid as target_uuid
LIMIT $limit
"#;

pub const GET_FACT_EDGE: &str = r#"
MATCH (s)-[r:FACT {uuid: $uuid}]->(t)
RETURN r, s.uuid as source_uuid, t.uuid as target_uuid
"#;

pub const GET_EPISODES: &str = r#"
MATCH (n:Episode {namespace: $namespace})
RETURN n
ORDER BY n.created_at DESC
LIMIT $last_n
"#;

pub const DELETE_FACT_EDGE: &str = r#"
MATCH ()-[r:FACT {uuid: $uuid}]->()
DELETE r
RETURN count(r) as deleted_count
"#;

pub const DELETE_EPISODE: &str = r#"
MATCH (n:Episode {uuid: $uuid})
DETACH DELETE n
RETURN count(n) as deleted_count
"#;

pub const CLEAR_NAMESPACE: &str = r#"
MATCH (n)
WHERE n.namespace = $namespace
DETACH DELETE n
"#;
