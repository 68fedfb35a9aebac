//! The mirror engine: object/connection registration, staleness discovery,
//! selection-set construction for refresh, and ingestion of connection and
//! own-data responses.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sea_query::{Alias, OnConflict, Query, SqliteQueryBuilder};
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::error::Error;
use crate::query::{Selection, Value};
use crate::schema::Schema;
use crate::store;

/// The pagination cursor a connection is resumed from. Distinguishes
/// "never fetched" (omit `after` entirely) from "fetched, possibly to an
/// explicit `null`/empty cursor", since conflating the two breaks
/// resumption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    Unset,
    Known(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFieldResult {
    #[serde(rename = "__typename")]
    pub typename: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionFieldResult {
    pub total_count: i64,
    pub page_info: PageInfo,
    pub nodes: Vec<NodeFieldResult>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OwnDataResult {
    pub primitives: BTreeMap<String, serde_json::Value>,
    pub links: BTreeMap<String, Option<NodeFieldResult>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleObject {
    pub typename: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleConnection {
    pub typename: String,
    pub id: String,
    pub fieldname: String,
    pub end_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Outdated {
    pub objects: Vec<StaleObject>,
    pub connections: Vec<StaleConnection>,
}

type TxFuture<'t, T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send + 't>>;

/// A local, persistent mirror of a remote GraphQL object graph, backed by a
/// single SQLite database.
pub struct Mirror {
    pool: SqlitePool,
    schema: Arc<Schema>,
    in_transaction: AtomicBool,
}

impl Mirror {
    /// Opens (or bootstraps) a mirror against `pool` using `schema`. See
    /// [`store::bootstrap`] for the idempotent initialization algorithm.
    pub async fn new(pool: SqlitePool, schema: Schema) -> Result<Self, Error> {
        store::bootstrap(&pool, &schema).await?;
        Ok(Mirror {
            pool,
            schema: Arc::new(schema),
            in_transaction: AtomicBool::new(false),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Runs `f` inside a single transaction: commits on `Ok`, rolls back on
    /// `Err`. Fails with [`Error::AlreadyInTransaction`] if called while
    /// another transaction driven by this mirror is in flight. The mirror
    /// owns its database exclusively, so this can only happen from
    /// reentrant misuse, not concurrent callers.
    async fn with_transaction<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: for<'t> FnOnce(&'t mut Transaction<'static, Sqlite>) -> TxFuture<'t, T>,
    {
        if self.in_transaction.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyInTransaction);
        }

        let outcome = async {
            let mut tx = self.pool.begin().await?;
            match f(&mut tx).await {
                Ok(value) => {
                    tx.commit().await?;
                    Ok(value)
                }
                Err(err) => {
                    let _ = tx.rollback().await;
                    Err(err)
                }
            }
        }
        .await;

        self.in_transaction.store(false, Ordering::SeqCst);
        outcome
    }

    /// Inserts a new `updates` row and returns its id. Every call yields a
    /// distinct id, even with a duplicate timestamp.
    pub async fn create_update(&self, timestamp_ms: i64) -> Result<i64, Error> {
        self.with_transaction(move |tx| {
            Box::pin(async move {
                let result = sqlx::query("INSERT INTO updates (time_epoch_millis) VALUES (?)")
                    .bind(timestamp_ms)
                    .execute(&mut **tx)
                    .await?;
                Ok(result.last_insert_rowid())
            })
        })
        .await
    }

    /// Registers an object, creating its `connections` rows if it is new.
    /// No-op if already registered with the same typename.
    pub async fn register_object(&self, typename: &str, id: &str) -> Result<(), Error> {
        let schema = Arc::clone(&self.schema);
        let typename = typename.to_string();
        let id = id.to_string();
        self.with_transaction(move |tx| {
            Box::pin(async move { register_object_core(tx, &schema, &typename, &id).await })
        })
        .await
    }

    /// Returns the objects and connections whose freshness stamp is older
    /// than `since_ms`, or that were never fetched, or (for connections)
    /// have more pages remaining.
    pub async fn find_outdated(&self, since_ms: i64) -> Result<Outdated, Error> {
        let mut tx = self.pool.begin().await?;

        let object_rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT o.typename, o.id
             FROM objects o
             LEFT JOIN updates u ON o.last_update = u.id
             WHERE o.last_update IS NULL OR u.time_epoch_millis < ?",
        )
        .bind(since_ms)
        .fetch_all(&mut *tx)
        .await?;

        let connection_rows: Vec<(String, String, String, Option<String>)> = sqlx::query_as(
            "SELECT o.typename, c.object_id, c.fieldname, c.end_cursor
             FROM connections c
             JOIN objects o ON o.id = c.object_id
             LEFT JOIN updates u ON c.last_update = u.id
             WHERE c.last_update IS NULL
                OR u.time_epoch_millis < ?
                OR c.has_next_page = 1",
        )
        .bind(since_ms)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Outdated {
            objects: object_rows
                .into_iter()
                .map(|(typename, id)| StaleObject { typename, id })
                .collect(),
            connections: connection_rows
                .into_iter()
                .map(|(typename, id, fieldname, end_cursor)| StaleConnection {
                    typename,
                    id,
                    fieldname,
                    end_cursor,
                })
                .collect(),
        })
    }

    /// The `{ __typename, id }` selection sufficient to register any object
    /// referenced transitively by another response.
    pub fn query_shallow(&self) -> Vec<Selection> {
        node_shape()
    }

    /// Builds the selection for one page of a connection field. `after` is
    /// omitted entirely when `cursor` is [`Cursor::Unset`] (never fetched),
    /// and included, even as an explicit `null`, when resuming from a known
    /// cursor.
    pub fn query_connection(&self, fieldname: &str, cursor: Cursor, page_size: u32) -> Selection {
        let mut field =
            Selection::field(fieldname.to_string()).arg("first", Value::literal(page_size as i64));

        if let Cursor::Known(end_cursor) = cursor {
            field = field.arg("after", Value::literal(end_cursor));
        }

        field.children([
            Selection::field("totalCount"),
            Selection::field("pageInfo").children([
                Selection::field("endCursor"),
                Selection::field("hasNextPage"),
            ]),
            Selection::field("nodes").children(node_shape()),
        ])
    }

    /// Builds the selection for one object's own data: its primitive
    /// fields and singular node links, each resolved to `{ __typename id }`.
    pub fn query_own_data(&self, typename: &str) -> Result<Vec<Selection>, Error> {
        let def = self
            .schema
            .get(typename)
            .ok_or_else(|| Error::UnknownType(typename.to_string()))?;

        if def.is_union() {
            return Err(Error::UnknownType(format!(
                "'{typename}' is a union, not an object"
            )));
        }

        let mut fields = node_shape();
        for name in def.primitive_fields() {
            fields.push(Selection::field(name.to_string()));
        }
        for (name, _target) in def.node_fields() {
            fields.push(Selection::field(name.to_string()).children(node_shape()));
        }
        Ok(fields)
    }

    /// Ingests one page of a connection response: updates the connection's
    /// pagination state, then appends each node as a
    /// registered object plus an ordered `connection_entries` row.
    pub async fn update_connection(
        &self,
        update_id: i64,
        object_id: &str,
        fieldname: &str,
        response: ConnectionFieldResult,
    ) -> Result<(), Error> {
        let schema = Arc::clone(&self.schema);
        let object_id = object_id.to_string();
        let fieldname = fieldname.to_string();

        self.with_transaction(move |tx| {
            Box::pin(async move {
                let connection_id: Option<(i64,)> = sqlx::query_as(
                    "SELECT id FROM connections WHERE object_id = ? AND fieldname = ?",
                )
                .bind(&object_id)
                .bind(&fieldname)
                .fetch_optional(&mut **tx)
                .await?;

                let connection_id = connection_id
                    .ok_or_else(|| Error::UnknownConnection {
                        object_id: object_id.clone(),
                        fieldname: fieldname.clone(),
                    })?
                    .0;

                sqlx::query(
                    "UPDATE connections
                     SET last_update = ?, total_count = ?, has_next_page = ?, end_cursor = ?
                     WHERE id = ?",
                )
                .bind(update_id)
                .bind(response.total_count)
                .bind(response.page_info.has_next_page)
                .bind(&response.page_info.end_cursor)
                .bind(connection_id)
                .execute(&mut **tx)
                .await?;

                let (mut next_idx,): (i64,) = sqlx::query_as(
                    "SELECT IFNULL(MAX(idx), 0) + 1 FROM connection_entries WHERE connection_id = ?",
                )
                .bind(connection_id)
                .fetch_one(&mut **tx)
                .await?;

                for node in response.nodes {
                    register_object_core(tx, &schema, &node.typename, &node.id).await?;

                    sqlx::query(
                        "INSERT INTO connection_entries (connection_id, idx, child_id) VALUES (?, ?, ?)",
                    )
                    .bind(connection_id)
                    .bind(next_idx)
                    .bind(&node.id)
                    .execute(&mut **tx)
                    .await?;

                    next_idx += 1;
                }

                Ok(())
            })
        })
        .await
    }

    /// Ingests one object's own-data response: writes its `data_T` row,
    /// updates each `links` row (registering linked children first), and
    /// stamps `last_update`.
    pub async fn update_own_data(
        &self,
        update_id: i64,
        typename: &str,
        id: &str,
        response: OwnDataResult,
    ) -> Result<(), Error> {
        let schema = Arc::clone(&self.schema);
        let typename = typename.to_string();
        let id = id.to_string();

        self.with_transaction(move |tx| {
            Box::pin(async move {
                let def = schema
                    .get(&typename)
                    .ok_or_else(|| Error::UnknownType(typename.clone()))?;

                if def.is_union() {
                    return Err(Error::UnknownType(format!(
                        "'{typename}' is a union, not an object"
                    )));
                }

                register_object_core(tx, &schema, &typename, &id).await?;

                let primitive_fields = def.primitive_fields();
                if !primitive_fields.is_empty() {
                    let values: Vec<Option<String>> = primitive_fields
                        .iter()
                        .map(|field| {
                            let value = response
                                .primitives
                                .get(*field)
                                .cloned()
                                .unwrap_or(serde_json::Value::Null);
                            json_scalar_to_text(&value)
                        })
                        .collect();

                    let sql = Query::insert()
                        .into_table(Alias::new(format!("data_{typename}")))
                        .columns(
                            std::iter::once(Alias::new("id"))
                                .chain(primitive_fields.iter().copied().map(Alias::new)),
                        )
                        .values_panic(
                            std::iter::once(id.clone().into())
                                .chain(values.clone().into_iter().map(Into::into)),
                        )
                        .on_conflict(
                            OnConflict::column(Alias::new("id"))
                                .update_columns(primitive_fields.iter().copied().map(Alias::new))
                                .to_owned(),
                        )
                        .to_string(SqliteQueryBuilder);

                    sqlx::query(&sql).execute(&mut **tx).await?;
                }

                for (fieldname, _target) in def.node_fields() {
                    let child = response.links.get(fieldname).cloned().flatten();
                    if let Some(child) = &child {
                        register_object_core(tx, &schema, &child.typename, &child.id).await?;
                    }
                    let child_id = child.as_ref().map(|c| c.id.clone());

                    let sql = Query::insert()
                        .into_table(Alias::new("links"))
                        .columns([
                            Alias::new("parent_id"),
                            Alias::new("fieldname"),
                            Alias::new("child_id"),
                        ])
                        .values_panic([
                            id.clone().into(),
                            fieldname.to_string().into(),
                            child_id.into(),
                        ])
                        .on_conflict(
                            OnConflict::columns([Alias::new("parent_id"), Alias::new("fieldname")])
                                .update_column(Alias::new("child_id"))
                                .to_owned(),
                        )
                        .to_string(SqliteQueryBuilder);

                    sqlx::query(&sql).execute(&mut **tx).await?;
                }

                sqlx::query("UPDATE objects SET last_update = ? WHERE id = ?")
                    .bind(update_id)
                    .bind(&id)
                    .execute(&mut **tx)
                    .await?;

                Ok(())
            })
        })
        .await
    }
}

fn node_shape() -> Vec<Selection> {
    vec![Selection::field("__typename"), Selection::field("id")]
}

fn json_scalar_to_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// The non-transactional registration core. Callers that batch many
/// registrations within one update (connection and own-data ingestion)
/// invoke this directly instead of opening a nested transaction.
async fn register_object_core(
    tx: &mut Transaction<'_, Sqlite>,
    schema: &Schema,
    typename: &str,
    id: &str,
) -> Result<(), Error> {
    let existing: Option<(String,)> = sqlx::query_as("SELECT typename FROM objects WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;

    if let Some((existing_typename,)) = existing {
        if existing_typename == typename {
            return Ok(());
        }
        return Err(Error::InconsistentType {
            id: id.to_string(),
            existing: existing_typename,
            attempted: typename.to_string(),
        });
    }

    let type_def = schema
        .get(typename)
        .ok_or_else(|| Error::UnknownType(typename.to_string()))?;

    if type_def.is_union() {
        return Err(Error::AmbiguousType {
            id: id.to_string(),
            typename: typename.to_string(),
        });
    }

    sqlx::query("INSERT INTO objects (id, typename, last_update) VALUES (?, ?, NULL)")
        .bind(id)
        .bind(typename)
        .execute(&mut **tx)
        .await?;

    for (fieldname, _element) in type_def.connection_fields() {
        sqlx::query(
            "INSERT INTO connections
                (object_id, fieldname, last_update, total_count, has_next_page, end_cursor)
             VALUES (?, ?, NULL, NULL, NULL, NULL)",
        )
        .bind(id)
        .bind(fieldname)
        .execute(&mut **tx)
        .await?;
    }

    tracing::debug!(%typename, %id, "registered object");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, TypeDef};

    fn github_like() -> Schema {
        let mut types = BTreeMap::new();
        types.insert(
            "Repository".to_string(),
            TypeDef::object([
                ("id", Field::id()),
                ("url", Field::primitive()),
                ("issues", Field::connection("Issue")),
            ]),
        );
        types.insert(
            "Issue".to_string(),
            TypeDef::object([
                ("id", Field::id()),
                ("url", Field::primitive()),
                ("title", Field::primitive()),
                ("comments", Field::connection("IssueComment")),
            ]),
        );
        types.insert(
            "IssueComment".to_string(),
            TypeDef::object([
                ("id", Field::id()),
                ("body", Field::primitive()),
                ("author", Field::node("Actor")),
            ]),
        );
        types.insert(
            "Actor".to_string(),
            TypeDef::union(["User", "Bot", "Organization"]),
        );
        for user_like in ["User", "Bot", "Organization"] {
            types.insert(
                user_like.to_string(),
                TypeDef::object([
                    ("id", Field::id()),
                    ("url", Field::primitive()),
                    ("login", Field::primitive()),
                ]),
            );
        }
        Schema::new(types).unwrap()
    }

    async fn memory_mirror(schema: Schema) -> Mirror {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        Mirror::new(pool, schema).await.unwrap()
    }

    #[tokio::test]
    async fn s3_object_and_connection_bootstrap() {
        let mirror = memory_mirror(github_like()).await;
        mirror
            .register_object("Issue", "issue:sourcecred/example-github#1")
            .await
            .unwrap();

        let objects: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM objects")
            .fetch_one(&mirror.pool)
            .await
            .unwrap();
        assert_eq!(objects.0, 1);

        let connections: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM connections WHERE fieldname = 'comments'")
                .fetch_one(&mirror.pool)
                .await
                .unwrap();
        assert_eq!(connections.0, 1);
    }

    #[tokio::test]
    async fn s4_inconsistent_type_rejected_and_original_preserved() {
        let mirror = memory_mirror(github_like()).await;
        mirror.register_object("Issue", "x").await.unwrap();

        let result = mirror.register_object("User", "x").await;
        assert!(matches!(result, Err(Error::InconsistentType { .. })));

        let (typename,): (String,) = sqlx::query_as("SELECT typename FROM objects WHERE id = 'x'")
            .fetch_one(&mirror.pool)
            .await
            .unwrap();
        assert_eq!(typename, "Issue");
    }

    #[tokio::test]
    async fn register_object_rejects_unknown_and_union_types() {
        let mirror = memory_mirror(github_like()).await;
        assert!(matches!(
            mirror.register_object("Ghost", "x").await,
            Err(Error::UnknownType(_))
        ));
        assert!(matches!(
            mirror.register_object("Actor", "x").await,
            Err(Error::AmbiguousType { .. })
        ));
    }

    async fn set_object_update(mirror: &Mirror, id: &str, update_id: Option<i64>) {
        sqlx::query("UPDATE objects SET last_update = ? WHERE id = ?")
            .bind(update_id)
            .bind(id)
            .execute(&mirror.pool)
            .await
            .unwrap();
    }

    async fn set_connection_state(
        mirror: &Mirror,
        object_id: &str,
        fieldname: &str,
        update_id: Option<i64>,
        has_next_page: bool,
        end_cursor: Option<&str>,
    ) {
        sqlx::query(
            "UPDATE connections SET last_update = ?, has_next_page = ?, end_cursor = ?
             WHERE object_id = ? AND fieldname = ?",
        )
        .bind(update_id)
        .bind(has_next_page)
        .bind(end_cursor)
        .bind(object_id)
        .bind(fieldname)
        .execute(&mirror.pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn s5_find_outdated_semantics() {
        let mirror = memory_mirror(github_like()).await;

        mirror.register_object("Repository", "R").await.unwrap();
        for issue in ["I1", "I2", "I3", "I4"] {
            mirror.register_object("Issue", issue).await.unwrap();
        }

        let u123 = mirror.create_update(123).await.unwrap();
        let u456 = mirror.create_update(456).await.unwrap();
        let u789 = mirror.create_update(789).await.unwrap();

        set_object_update(&mirror, "R", Some(u123)).await;
        set_object_update(&mirror, "I1", Some(u789)).await;
        set_object_update(&mirror, "I2", None).await;
        set_object_update(&mirror, "I3", None).await;
        set_object_update(&mirror, "I4", Some(u456)).await;

        set_connection_state(&mirror, "R", "issues", Some(u123), false, Some("cR")).await;
        set_connection_state(&mirror, "I1", "comments", None, false, Some("c1")).await;
        set_connection_state(&mirror, "I2", "comments", Some(u789), true, None).await;
        set_connection_state(&mirror, "I3", "comments", Some(u789), false, None).await;
        set_connection_state(&mirror, "I4", "comments", Some(u456), false, Some("c4")).await;

        let outdated = mirror.find_outdated(456).await.unwrap();

        let stale_object_ids: std::collections::BTreeSet<_> =
            outdated.objects.iter().map(|o| o.id.clone()).collect();
        assert_eq!(
            stale_object_ids,
            ["R", "I2", "I3"].into_iter().map(String::from).collect()
        );

        let stale_connections: std::collections::BTreeMap<_, _> = outdated
            .connections
            .iter()
            .map(|c| (c.id.clone(), c.end_cursor.clone()))
            .collect();
        assert_eq!(stale_connections.len(), 3);
        assert_eq!(stale_connections.get("R").unwrap().as_deref(), Some("cR"));
        assert_eq!(stale_connections.get("I1").unwrap().as_deref(), Some("c1"));
        assert_eq!(stale_connections.get("I2").unwrap(), &None);
    }

    #[tokio::test]
    async fn s6_ingestion_with_auto_registration() {
        let mirror = memory_mirror(github_like()).await;
        mirror.register_object("Repository", "R").await.unwrap();
        let u = mirror.create_update(1000).await.unwrap();

        mirror
            .update_connection(
                u,
                "R",
                "issues",
                ConnectionFieldResult {
                    total_count: 2,
                    page_info: PageInfo {
                        has_next_page: false,
                        end_cursor: Some("c".to_string()),
                    },
                    nodes: vec![
                        NodeFieldResult {
                            typename: "Issue".to_string(),
                            id: "i1".to_string(),
                        },
                        NodeFieldResult {
                            typename: "Issue".to_string(),
                            id: "i2".to_string(),
                        },
                    ],
                },
            )
            .await
            .unwrap();

        let entry_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM connection_entries")
            .fetch_one(&mirror.pool)
            .await
            .unwrap();
        assert_eq!(entry_count.0, 2);

        let indices: Vec<(i64,)> =
            sqlx::query_as("SELECT idx FROM connection_entries ORDER BY idx")
                .fetch_all(&mirror.pool)
                .await
                .unwrap();
        assert_eq!(indices, vec![(1,), (2,)]);

        let outdated = mirror.find_outdated(0).await.unwrap();
        let stale_ids: std::collections::BTreeSet<_> =
            outdated.objects.iter().map(|o| o.id.clone()).collect();
        assert!(stale_ids.contains("i1"));
        assert!(stale_ids.contains("i2"));

        let stale_connection_fields: Vec<_> = outdated
            .connections
            .iter()
            .filter(|c| c.id == "R" && c.fieldname == "issues")
            .collect();
        assert!(stale_connection_fields.is_empty());
    }

    #[tokio::test]
    async fn update_connection_fails_for_unregistered_owner() {
        let mirror = memory_mirror(github_like()).await;
        let u = mirror.create_update(1).await.unwrap();
        let result = mirror
            .update_connection(
                u,
                "missing",
                "issues",
                ConnectionFieldResult {
                    total_count: 0,
                    page_info: PageInfo {
                        has_next_page: false,
                        end_cursor: None,
                    },
                    nodes: vec![],
                },
            )
            .await;
        assert!(matches!(result, Err(Error::UnknownConnection { .. })));
    }

    #[tokio::test]
    async fn update_own_data_writes_primitives_and_links() {
        let mirror = memory_mirror(github_like()).await;
        mirror.register_object("IssueComment", "c1").await.unwrap();
        let u = mirror.create_update(1).await.unwrap();

        let mut primitives = BTreeMap::new();
        primitives.insert("body".to_string(), serde_json::json!("hello world"));
        let mut links = BTreeMap::new();
        links.insert(
            "author".to_string(),
            Some(NodeFieldResult {
                typename: "User".to_string(),
                id: "u1".to_string(),
            }),
        );

        mirror
            .update_own_data(u, "IssueComment", "c1", OwnDataResult { primitives, links })
            .await
            .unwrap();

        let (body,): (String,) = sqlx::query_as("SELECT body FROM data_IssueComment WHERE id = 'c1'")
            .fetch_one(&mirror.pool)
            .await
            .unwrap();
        assert_eq!(body, "hello world");

        let (child_id,): (Option<String>,) =
            sqlx::query_as("SELECT child_id FROM links WHERE parent_id = 'c1' AND fieldname = 'author'")
                .fetch_one(&mirror.pool)
                .await
                .unwrap();
        assert_eq!(child_id.as_deref(), Some("u1"));

        let (linked_typename,): (String,) =
            sqlx::query_as("SELECT typename FROM objects WHERE id = 'u1'")
                .fetch_one(&mirror.pool)
                .await
                .unwrap();
        assert_eq!(linked_typename, "User");
    }

    #[tokio::test]
    async fn query_connection_omits_after_when_cursor_unset_but_includes_null_cursor() {
        let mirror = memory_mirror(github_like()).await;
        let unset = mirror.query_connection("issues", Cursor::Unset, 100);
        let known_null = mirror.query_connection("issues", Cursor::Known(None), 100);

        assert!(!unset.render().contains("after"));
        assert!(known_null.render().contains("after: null"));
    }

    #[tokio::test]
    async fn query_own_data_includes_primitives_and_node_fields() {
        let mirror = memory_mirror(github_like()).await;
        let selections = mirror.query_own_data("IssueComment").unwrap();
        let rendered = selections
            .iter()
            .map(Selection::render)
            .collect::<Vec<_>>()
            .join("");
        assert!(rendered.contains("body"));
        assert!(rendered.contains("author {"));
    }

    #[tokio::test]
    async fn reentrant_transaction_attempt_fails() {
        // A direct unit check of the guard: with_transaction is private,
        // so we exercise it through two overlapping mutations is not
        // possible without concurrency; instead assert the flag resets
        // after a normal call so a subsequent call succeeds.
        let mirror = memory_mirror(github_like()).await;
        mirror.register_object("Repository", "R").await.unwrap();
        assert!(!mirror.in_transaction.load(Ordering::SeqCst));
        mirror.register_object("Repository", "R").await.unwrap();
    }
}
