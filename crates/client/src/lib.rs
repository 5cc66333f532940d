//! [`Persistence`] over a PostgREST-style hosted backend.
//!
//! Tables are reached at `<base_url>/rest/v1/<table>`; the transaction insert
//! goes through the `insert_transaction_and_items` RPC so the row and its
//! items are created atomically.

use api_types::{
    catalog::{Account, Category, NewAccount, NewCategory},
    ledger::{
        InsertedId, InsertedTransaction, ItemUpsertRow, NewItem, NewTransaction, Transaction,
        TransactionUpsertRow,
    },
};
use engine::{Persistence, PersistenceError, ResultPersistence};
use reqwest::{Method, RequestBuilder, Url, header::HeaderValue};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, warn};
use uuid::Uuid;

pub use error::ClientError;

mod error;

type Result<T> = std::result::Result<T, ClientError>;

const TRANSACTIONS: &str = "transactions";
const ITEMS: &str = "items";
const CATEGORIES: &str = "categories";
const ACCOUNTS: &str = "accounts";

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

#[derive(Debug, Clone)]
pub struct RestBackend {
    base_url: Url,
    api_key: String,
    access_token: Option<String>,
    http: reqwest::Client,
}

impl RestBackend {
    /// `access_token` is the signed-in user's JWT; without one requests are
    /// authorised with the API key alone.
    pub fn new(base_url: &str, api_key: &str, access_token: Option<String>) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).map_err(|err| ClientError::InvalidUrl(err.to_string()))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            base_url,
            api_key: api_key.to_string(),
            access_token,
            http: reqwest::Client::new(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(&format!("rest/v1/{path}"))
            .map_err(|err| ClientError::InvalidUrl(err.to_string()))
    }

    fn table(&self, table: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.endpoint(table)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let token = self.access_token.as_deref().unwrap_or(&self.api_key);
        self.http
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        let res = request.send().await?;
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }

        let text = res.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&text)
            .map(|err| err.message)
            .unwrap_or(text);
        warn!(status = status.as_u16(), %message, "backend rejected request");
        Err(ClientError::from_status(status.as_u16(), message))
    }

    async fn fetch<T: DeserializeOwned>(&self, table: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = self.table(table, query)?;
        debug!(%url, "fetch");
        let res = self.send(self.request(Method::GET, url)).await?;
        Ok(res.json::<T>().await?)
    }

    async fn insert<B: Serialize, T: DeserializeOwned>(&self, table: &str, rows: &B) -> Result<T> {
        let url = self.table(table, &[("select", "id")])?;
        debug!(%url, "insert");
        let request = self
            .request(Method::POST, url)
            .header("Prefer", HeaderValue::from_static("return=representation"))
            .json(rows);
        Ok(self.send(request).await?.json::<T>().await?)
    }

    async fn upsert<B: Serialize>(&self, table: &str, rows: &B) -> Result<()> {
        let url = self.table(table, &[("on_conflict", "id")])?;
        debug!(%url, "upsert");
        let request = self
            .request(Method::POST, url)
            .header(
                "Prefer",
                HeaderValue::from_static("resolution=merge-duplicates,return=minimal"),
            )
            .json(rows);
        self.send(request).await?;
        Ok(())
    }

    async fn delete(&self, table: &str, id: Uuid) -> Result<()> {
        let filter = format!("eq.{id}");
        let url = self.table(table, &[("id", filter.as_str())])?;
        debug!(%url, "delete");
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    async fn rpc<B: Serialize, T: DeserializeOwned>(&self, function: &str, body: &B) -> Result<T> {
        let url = self.endpoint(&format!("rpc/{function}"))?;
        debug!(%url, "rpc");
        let request = self.request(Method::POST, url).json(body);
        Ok(self.send(request).await?.json::<T>().await?)
    }
}

impl Persistence for RestBackend {
    async fn fetch_transactions(&self) -> ResultPersistence<Vec<Transaction>> {
        Ok(self
            .fetch(
                TRANSACTIONS,
                &[
                    ("select", "*,items(*)"),
                    ("order", "date.desc,order_position.desc"),
                    ("items.order", "order_position.asc"),
                ],
            )
            .await?)
    }

    async fn fetch_categories(&self) -> ResultPersistence<Vec<Category>> {
        Ok(self
            .fetch(CATEGORIES, &[("select", "*"), ("order", "order_position.asc")])
            .await?)
    }

    async fn fetch_accounts(&self) -> ResultPersistence<Vec<Account>> {
        Ok(self
            .fetch(ACCOUNTS, &[("select", "*"), ("order", "order_position.asc")])
            .await?)
    }

    async fn insert_items(&self, items: Vec<NewItem>) -> ResultPersistence<Vec<InsertedId>> {
        Ok(self.insert(ITEMS, &items).await?)
    }

    async fn insert_transaction_and_items(
        &self,
        transaction: NewTransaction,
    ) -> ResultPersistence<InsertedTransaction> {
        Ok(self
            .rpc("insert_transaction_and_items", &transaction)
            .await?)
    }

    async fn upsert_transactions(&self, rows: Vec<TransactionUpsertRow>) -> ResultPersistence<()> {
        Ok(self.upsert(TRANSACTIONS, &rows).await?)
    }

    async fn upsert_items(&self, rows: Vec<ItemUpsertRow>) -> ResultPersistence<()> {
        Ok(self.upsert(ITEMS, &rows).await?)
    }

    async fn delete_transaction(&self, id: Uuid) -> ResultPersistence<()> {
        Ok(self.delete(TRANSACTIONS, id).await?)
    }

    async fn delete_item(&self, id: Uuid) -> ResultPersistence<()> {
        Ok(self.delete(ITEMS, id).await?)
    }

    async fn insert_categories(&self, rows: Vec<NewCategory>) -> ResultPersistence<Vec<InsertedId>> {
        Ok(self.insert(CATEGORIES, &rows).await?)
    }

    async fn insert_accounts(&self, rows: Vec<NewAccount>) -> ResultPersistence<Vec<InsertedId>> {
        Ok(self.insert(ACCOUNTS, &rows).await?)
    }

    async fn upsert_categories(&self, rows: Vec<Category>) -> ResultPersistence<()> {
        Ok(self.upsert(CATEGORIES, &rows).await?)
    }

    async fn upsert_accounts(&self, rows: Vec<Account>) -> ResultPersistence<()> {
        Ok(self.upsert(ACCOUNTS, &rows).await?)
    }

    async fn delete_category(&self, id: Uuid) -> ResultPersistence<()> {
        Ok(self.delete(CATEGORIES, id).await?)
    }

    async fn delete_account(&self, id: Uuid) -> ResultPersistence<()> {
        Ok(self.delete(ACCOUNTS, id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_types::ledger::ItemFields;

    fn backend() -> RestBackend {
        RestBackend::new("https://demo.example.co", "anon-key", None).unwrap()
    }

    #[test]
    fn table_urls_live_under_rest_v1() {
        let url = backend()
            .table(TRANSACTIONS, &[("select", "*,items(*)")])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://demo.example.co/rest/v1/transactions?select=*%2Citems%28*%29"
        );
    }

    #[test]
    fn base_path_is_kept() {
        let backend = RestBackend::new("http://localhost:54321/proxy", "k", None).unwrap();
        let url = backend.endpoint("rpc/insert_transaction_and_items").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:54321/proxy/rest/v1/rpc/insert_transaction_and_items"
        );
    }

    #[test]
    fn delete_filters_by_id() {
        let id = Uuid::nil();
        let filter = format!("eq.{id}");
        let url = backend()
            .table(ITEMS, &[("id", filter.as_str())])
            .unwrap();
        assert_eq!(
            url.query(),
            Some("id=eq.00000000-0000-0000-0000-000000000000")
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(matches!(
            RestBackend::new("not a url", "k", None),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn statuses_map_to_persistence_errors() {
        let rejected = PersistenceError::from(ClientError::from_status(409, "dup".into()));
        assert_eq!(rejected, PersistenceError::Rejected("conflict: dup".into()));

        let invalid = PersistenceError::from(ClientError::from_status(400, "bad".into()));
        assert!(matches!(invalid, PersistenceError::Rejected(_)));

        let auth = PersistenceError::from(ClientError::from_status(401, String::new()));
        assert_eq!(auth, PersistenceError::Rejected("unauthorized".into()));

        let down = PersistenceError::from(ClientError::from_status(503, "busy".into()));
        assert_eq!(down, PersistenceError::Unavailable("server error: busy".into()));
    }

    #[test]
    fn new_item_is_sent_flat() {
        let item = NewItem {
            transaction_id: Uuid::nil(),
            fields: ItemFields {
                name: "Milk".into(),
                amount: "1.20".into(),
                category_id: None,
                account_id: None,
            },
        };

        let json = serde_json::to_value(&item).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "transaction_id": "00000000-0000-0000-0000-000000000000",
                "name": "Milk",
                "amount": "1.20",
                "category_id": null,
                "account_id": null,
            })
        );
    }

    #[test]
    fn transaction_rows_use_iso_dates() {
        let row = TransactionUpsertRow {
            id: Uuid::nil(),
            date: chrono::NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            name: "Rent".into(),
            order_position: 3,
        };

        let json = serde_json::to_value(&row).unwrap();

        assert_eq!(json["date"], "2024-05-01");
        assert_eq!(json["order_position"], 3);
    }
}
