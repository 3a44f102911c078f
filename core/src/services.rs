//! Thin resource wrappers over the two clients.
//!
//! Catalog, order and coupon payloads have no client-side invariants, so
//! they travel as `serde_json::Value` and are returned verbatim.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::{ApiClients, HttpClient};
use crate::error::ApiError;
use crate::multipart::MultipartForm;

/// Parse a JSON body, treating an empty one (204) as `null`.
fn json_or_null(response: crate::http::HttpResponse) -> Result<Value, ApiError> {
    if response.body.is_empty() {
        return Ok(Value::Null);
    }
    response.json()
}

/// CRUD over one collection path.
#[derive(Debug, Clone)]
struct Collection {
    client: HttpClient,
    path: &'static str,
}

impl Collection {
    async fn list(&self) -> Result<Vec<Value>, ApiError> {
        self.client.get(self.path).await?.json()
    }

    async fn get(&self, id: &str) -> Result<Value, ApiError> {
        self.client
            .get(&format!("{}/{id}", self.path))
            .await?
            .json()
    }

    async fn create(&self, input: &Value) -> Result<Value, ApiError> {
        json_or_null(self.client.post(self.path, input).await?)
    }

    async fn update(&self, id: &str, input: &Value) -> Result<Value, ApiError> {
        json_or_null(
            self.client
                .put(&format!("{}/{id}", self.path), input)
                .await?,
        )
    }

    async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.client
            .delete(&format!("{}/{id}", self.path))
            .await?;
        Ok(())
    }
}

macro_rules! collection_service {
    ($(#[$meta:meta])* $name:ident, $path:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            inner: Collection,
        }

        impl $name {
            pub fn new(clients: &ApiClients) -> Self {
                Self {
                    inner: Collection {
                        client: clients.application.clone(),
                        path: $path,
                    },
                }
            }

            pub async fn list(&self) -> Result<Vec<Value>, ApiError> {
                self.inner.list().await
            }

            pub async fn create(&self, input: &Value) -> Result<Value, ApiError> {
                self.inner.create(input).await
            }

            pub async fn update(&self, id: &str, input: &Value) -> Result<Value, ApiError> {
                self.inner.update(id, input).await
            }

            pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
                self.inner.delete(id).await
            }
        }
    };
}

collection_service!(
    /// `/products`; listing and reads are public.
    ProductService,
    "/products"
);
collection_service!(CategoryService, "/categories");
collection_service!(VariantService, "/variants");

impl ProductService {
    pub async fn get(&self, id: &str) -> Result<Value, ApiError> {
        self.inner.get(id).await
    }
}

#[derive(Debug, Serialize)]
struct RefundRequest<'a> {
    amount: f64,
    reason: &'a str,
}

#[derive(Debug, Clone)]
pub struct OrderService {
    inner: Collection,
}

impl OrderService {
    pub fn new(clients: &ApiClients) -> Self {
        Self {
            inner: Collection {
                client: clients.application.clone(),
                path: "/orders",
            },
        }
    }

    pub async fn list(&self) -> Result<Vec<Value>, ApiError> {
        self.inner.list().await
    }

    pub async fn get(&self, id: &str) -> Result<Value, ApiError> {
        self.inner.get(id).await
    }

    pub async fn refund(&self, id: &str, amount: f64, reason: &str) -> Result<Value, ApiError> {
        let response = self
            .inner
            .client
            .post(
                &format!("/orders/{id}/refund"),
                &RefundRequest { amount, reason },
            )
            .await?;
        json_or_null(response)
    }
}

#[derive(Debug, Clone)]
pub struct CouponService {
    inner: Collection,
}

impl CouponService {
    pub fn new(clients: &ApiClients) -> Self {
        Self {
            inner: Collection {
                client: clients.application.clone(),
                path: "/coupons",
            },
        }
    }

    pub async fn list(&self) -> Result<Vec<Value>, ApiError> {
        self.inner.list().await
    }

    pub async fn create(&self, input: &Value) -> Result<Value, ApiError> {
        self.inner.create(input).await
    }
}

/// Where the upload service stored a file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadedFile {
    #[serde(alias = "url", alias = "filePath")]
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct UploadService {
    client: HttpClient,
}

impl UploadService {
    pub fn new(clients: &ApiClients) -> Self {
        Self {
            client: clients.upload.clone(),
        }
    }

    pub async fn upload(
        &self,
        file_name: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<UploadedFile, ApiError> {
        let form = MultipartForm::new().file("file", file_name, content_type, data);
        self.client.post_multipart("/upload", form).await?.json()
    }
}
