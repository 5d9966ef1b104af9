use super::models::{
    CollectionSelector, CompositeFilter, CompositeOperator, Direction, FieldFilter, FieldOperator,
    FieldReference, Order, QueryFilter, RunQueryRequest, RunQueryResponse, StructuredQuery,
};
use super::snapshot::{DocumentSnapshot, QuerySnapshot};
use super::value::json_to_value;
use super::FirestoreError;
use crate::core::parse_error_response;
use reqwest::header;
use reqwest_middleware::ClientWithMiddleware;
use serde::Serialize;
use tracing::debug;

/// A definition of a Firestore query against one collection.
///
/// Filters are AND-ed together; order clauses apply in the order they are
/// added, the first being the primary sort key.
#[derive(Clone, Debug)]
pub struct Query {
    pub(crate) collection_id: String,
    pub(crate) query: StructuredQuery,
}

impl Query {
    /// Creates a new `Query` targeting the specified collection.
    pub fn new(collection_id: impl Into<String>) -> Self {
        let collection_id = collection_id.into();
        Self {
            collection_id: collection_id.clone(),
            query: StructuredQuery {
                from: Some(vec![CollectionSelector {
                    collection_id,
                    all_descendants: None,
                }]),
                where_clause: None,
                order_by: None,
                offset: None,
                limit: None,
            },
        }
    }

    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }

    /// The structured query as it will be sent.
    pub fn structured_query(&self) -> &StructuredQuery {
        &self.query
    }

    /// Adds a filter to the query.
    pub fn where_filter<T: Serialize>(
        mut self,
        field: &str,
        op: FieldOperator,
        value: T,
    ) -> Result<Self, FirestoreError> {
        let value = json_to_value(serde_json::to_value(value)?)?;

        let filter = QueryFilter::FieldFilter(FieldFilter {
            field: FieldReference::from_dotted(field),
            op,
            value,
        });

        self.query.where_clause = Some(match self.query.where_clause.take() {
            None => filter,
            Some(QueryFilter::CompositeFilter(mut composite))
                if composite.op == CompositeOperator::And =>
            {
                composite.filters.push(filter);
                QueryFilter::CompositeFilter(composite)
            }
            Some(existing) => QueryFilter::CompositeFilter(CompositeFilter {
                op: CompositeOperator::And,
                filters: vec![existing, filter],
            }),
        });

        Ok(self)
    }

    /// Sorts the query results by the specified field.
    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        let order = Order {
            field: FieldReference::from_dotted(field),
            direction,
        };

        self.query.order_by.get_or_insert_with(Vec::new).push(order);
        self
    }

    /// Limits the number of documents returned.
    pub fn limit(mut self, limit: i32) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Skips the first N documents.
    pub fn offset(mut self, offset: i32) -> Self {
        self.query.offset = Some(offset);
        self
    }
}

/// A `Query` attached to a Firestore client, ready for execution.
#[derive(Clone)]
pub struct ExecutableQuery<'a> {
    pub(crate) client: &'a ClientWithMiddleware,
    pub(crate) parent_path: String,
    pub(crate) query: Query,
}

impl<'a> ExecutableQuery<'a> {
    pub(crate) fn new(client: &'a ClientWithMiddleware, parent_path: String, query: Query) -> Self {
        Self {
            client,
            parent_path,
            query,
        }
    }

    pub fn where_filter<T: Serialize>(
        self,
        field: &str,
        op: FieldOperator,
        value: T,
    ) -> Result<Self, FirestoreError> {
        Ok(Self {
            query: self.query.where_filter(field, op, value)?,
            ..self
        })
    }

    pub fn order_by(self, field: &str, direction: Direction) -> Self {
        Self {
            query: self.query.order_by(field, direction),
            ..self
        }
    }

    pub fn limit(self, limit: i32) -> Self {
        Self {
            query: self.query.limit(limit),
            ..self
        }
    }

    /// Runs the query once and returns a snapshot of the matching documents.
    pub async fn get(&self) -> Result<QuerySnapshot, FirestoreError> {
        let url = format!("{}:runQuery", self.parent_path);

        let request = RunQueryRequest {
            structured_query: self.query.query.clone(),
        };
        debug!(collection = %self.query.collection_id, "running query");

        let response = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&request)?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FirestoreError::ApiError(
                parse_error_response(response, "Run query failed").await,
            ));
        }

        let responses: Vec<RunQueryResponse> = response.json().await?;

        let mut snapshot = QuerySnapshot::default();
        for res in responses {
            if let Some(rt) = res.read_time {
                snapshot.read_time = Some(rt);
            }
            if let Some(doc) = res.document {
                snapshot.documents.push(DocumentSnapshot::from_document(doc));
            }
        }

        Ok(snapshot)
    }
}
