use crate::store::{CatalogStore, NewProduct, Product, TenantRegistry};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("bot not found")]
    TenantNotFound,
    #[error("product not found")]
    ProductNotFound,
    #[error("bot does not belong to this user")]
    NotOwner,
    #[error("price must be at least 0.01, got {0}")]
    InvalidPrice(Decimal),
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Object storage holding product images.
///
/// No implementation ships with the crate. Without one attached through
/// [`ProductService::with_image_store`], removing a product leaves its image
/// where it is.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn delete(&self, image_url: &str) -> anyhow::Result<()>;
}

/// Editable product fields.
#[derive(Debug, Clone)]
pub struct ProductDraft {
    pub name: String,
    pub price: Decimal,
    pub description: Option<String>,
    pub catalog: String,
    pub subcategory: String,
    pub image_url: Option<String>,
    pub in_stock: bool,
}

impl ProductDraft {
    fn validate(&self) -> Result<(), CatalogError> {
        if self.name.trim().is_empty() {
            return Err(CatalogError::Invalid("product name must not be blank".into()));
        }
        if self.price < Decimal::new(1, 2) {
            return Err(CatalogError::InvalidPrice(self.price));
        }
        Ok(())
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Owner-checked catalog administration.
pub struct ProductService {
    registry: Arc<dyn TenantRegistry>,
    catalog: Arc<dyn CatalogStore>,
    images: Option<Arc<dyn ImageStore>>,
}

impl ProductService {
    pub fn new(registry: Arc<dyn TenantRegistry>, catalog: Arc<dyn CatalogStore>) -> Self {
        Self {
            registry,
            catalog,
            images: None,
        }
    }

    #[must_use]
    pub fn with_image_store(mut self, images: Arc<dyn ImageStore>) -> Self {
        self.images = Some(images);
        self
    }

    fn check_owner(&self, tenant_id: i64, owner_id: i64) -> Result<(), CatalogError> {
        let tenant = self
            .registry
            .find_by_id(tenant_id)?
            .ok_or(CatalogError::TenantNotFound)?;
        if tenant.owner_id != owner_id {
            return Err(CatalogError::NotOwner);
        }
        Ok(())
    }

    pub fn get(&self, owner_id: i64, product_id: i64) -> Result<Product, CatalogError> {
        let product = self
            .catalog
            .product(product_id)?
            .ok_or(CatalogError::ProductNotFound)?;
        self.check_owner(product.tenant_id, owner_id)?;
        Ok(product)
    }

    pub fn list(&self, owner_id: i64, tenant_id: i64) -> Result<Vec<Product>, CatalogError> {
        self.check_owner(tenant_id, owner_id)?;
        Ok(self.catalog.products_for_tenant(tenant_id)?)
    }

    pub fn create(
        &self,
        owner_id: i64,
        tenant_id: i64,
        draft: ProductDraft,
    ) -> Result<Product, CatalogError> {
        self.check_owner(tenant_id, owner_id)?;
        draft.validate()?;
        let product = self.catalog.insert_product(NewProduct {
            tenant_id,
            name: draft.name.trim().to_string(),
            price: draft.price,
            description: trimmed(draft.description),
            catalog: draft.catalog.trim().to_string(),
            subcategory: draft.subcategory.trim().to_string(),
            image_url: trimmed(draft.image_url),
            in_stock: draft.in_stock,
        })?;
        tracing::info!(tenant_id, product_id = product.id, "Product created");
        Ok(product)
    }

    pub fn update(
        &self,
        owner_id: i64,
        product_id: i64,
        draft: ProductDraft,
    ) -> Result<Product, CatalogError> {
        let mut product = self.get(owner_id, product_id)?;
        draft.validate()?;
        product.name = draft.name.trim().to_string();
        product.price = draft.price;
        product.description = trimmed(draft.description);
        product.catalog = draft.catalog.trim().to_string();
        product.subcategory = draft.subcategory.trim().to_string();
        product.image_url = trimmed(draft.image_url);
        product.in_stock = draft.in_stock;
        self.catalog.update_product(&product)?;
        Ok(product)
    }

    /// Remove the product; its image is deleted first, best effort.
    pub async fn delete(&self, owner_id: i64, product_id: i64) -> Result<(), CatalogError> {
        let product = self.get(owner_id, product_id)?;
        if let (Some(images), Some(url)) = (&self.images, product.image()) {
            if let Err(e) = images.delete(url).await {
                tracing::warn!(product_id, "Failed to delete product image {url}: {e:#}");
            }
        }
        self.catalog.delete_product(product.id)?;
        tracing::info!(tenant_id = product.tenant_id, product_id, "Product deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NewTenant, SqliteStore, PLATFORM_TELEGRAM};
    use parking_lot::Mutex;
    use std::str::FromStr;

    #[derive(Default)]
    struct RecordingImages {
        deleted: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl ImageStore for RecordingImages {
        async fn delete(&self, image_url: &str) -> anyhow::Result<()> {
            self.deleted.lock().push(image_url.to_string());
            if self.fail {
                anyhow::bail!("bucket unavailable");
            }
            Ok(())
        }
    }

    fn setup() -> (Arc<SqliteStore>, ProductService, i64) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let tenant = store
            .insert_tenant(NewTenant {
                display_name: "Shop".into(),
                identifier: "shopbot".into(),
                platform: PLATFORM_TELEGRAM.into(),
                access_token: "1:tok".into(),
                platform_api_id: 1,
                shop_name: None,
                owner_id: 1,
                description: None,
            })
            .unwrap();
        let service = ProductService::new(store.clone(), store.clone());
        (store, service, tenant.id)
    }

    fn draft(name: &str, price: &str) -> ProductDraft {
        ProductDraft {
            name: name.into(),
            price: Decimal::from_str(price).unwrap(),
            description: Some(" Ceramic ".into()),
            catalog: " Home ".into(),
            subcategory: "Kitchen".into(),
            image_url: Some("http://img/mug.jpg".into()),
            in_stock: true,
        }
    }

    #[test]
    fn create_trims_and_persists() {
        let (store, service, tenant_id) = setup();
        let product = service.create(1, tenant_id, draft(" Mug ", "9.99")).unwrap();
        assert_eq!(product.name, "Mug");
        assert_eq!(product.catalog, "Home");
        assert_eq!(product.description.as_deref(), Some("Ceramic"));
        assert_eq!(store.product(product.id).unwrap().unwrap(), product);
    }

    #[test]
    fn price_below_minimum_is_rejected() {
        let (_store, service, tenant_id) = setup();
        assert!(matches!(
            service.create(1, tenant_id, draft("Mug", "0.00")),
            Err(CatalogError::InvalidPrice(_))
        ));
        assert!(service.create(1, tenant_id, draft("Mug", "0.01")).is_ok());
    }

    #[test]
    fn foreign_owner_is_rejected_everywhere() {
        let (_store, service, tenant_id) = setup();
        let product = service.create(1, tenant_id, draft("Mug", "9.99")).unwrap();
        assert!(matches!(
            service.create(2, tenant_id, draft("Cup", "1")),
            Err(CatalogError::NotOwner)
        ));
        assert!(matches!(service.list(2, tenant_id), Err(CatalogError::NotOwner)));
        assert!(matches!(
            service.update(2, product.id, draft("Cup", "1")),
            Err(CatalogError::NotOwner)
        ));
        assert!(matches!(
            service.list(1, tenant_id + 50),
            Err(CatalogError::TenantNotFound)
        ));
    }

    #[test]
    fn update_replaces_fields() {
        let (_store, service, tenant_id) = setup();
        let product = service.create(1, tenant_id, draft("Mug", "9.99")).unwrap();
        let mut changed = draft("Big Mug", "12.50");
        changed.image_url = Some("  ".into());
        changed.in_stock = false;
        let updated = service.update(1, product.id, changed).unwrap();
        assert_eq!(updated.name, "Big Mug");
        assert!(updated.image_url.is_none());
        assert!(!updated.in_stock);
        assert_eq!(service.list(1, tenant_id).unwrap(), vec![updated]);
    }

    #[tokio::test]
    async fn delete_removes_image_first_and_tolerates_failure() {
        let (store, service, tenant_id) = setup();
        let images = Arc::new(RecordingImages {
            fail: true,
            ..RecordingImages::default()
        });
        let service = service.with_image_store(images.clone());
        let product = service.create(1, tenant_id, draft("Mug", "9.99")).unwrap();

        service.delete(1, product.id).await.unwrap();
        assert_eq!(images.deleted.lock().as_slice(), &["http://img/mug.jpg".to_string()]);
        assert!(store.product(product.id).unwrap().is_none());
        assert!(matches!(
            service.delete(1, product.id).await,
            Err(CatalogError::ProductNotFound)
        ));
    }

    #[tokio::test]
    async fn delete_without_image_store_only_removes_row() {
        let (store, service, tenant_id) = setup();
        let product = service.create(1, tenant_id, draft("Mug", "9.99")).unwrap();

        service.delete(1, product.id).await.unwrap();
        assert!(store.product(product.id).unwrap().is_none());
    }
}
