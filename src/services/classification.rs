use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::errors::ServiceError;
use crate::models::catalog::line_sequence;
use crate::models::{ProductTemplate, ProductType};
use crate::repositories::CatalogRepository;

/// Resolves the product type that classifies (and orders) a BOM line.
#[derive(Clone)]
pub struct ProductClassifier {
    catalog: Arc<dyn CatalogRepository>,
}

impl ProductClassifier {
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { catalog }
    }

    /// A template's own type wins; otherwise the nearest category up the
    /// parent chain that sets one. Malformed (cyclic) chains stop the walk.
    pub async fn resolve(
        &self,
        template: &ProductTemplate,
    ) -> Result<Option<ProductType>, ServiceError> {
        if let Some(type_id) = template.product_type_id {
            return self.catalog.find_product_type(type_id).await;
        }

        let mut visited = HashSet::new();
        let mut current = template.categ_id;
        while let Some(categ_id) = current {
            if !visited.insert(categ_id) {
                warn!(
                    categ_id,
                    product_tmpl_id = template.id,
                    "category cycle detected while resolving product type"
                );
                break;
            }
            let Some(category) = self.catalog.find_category(categ_id).await? else {
                debug!(categ_id, "category missing from catalog");
                break;
            };
            if let Some(type_id) = category.product_type_id {
                return self.catalog.find_product_type(type_id).await;
            }
            current = category.parent_id;
        }
        Ok(None)
    }

    /// Line sequence for a product type id (0 when unset or non-numeric)
    pub async fn sequence_for(&self, product_type_id: Option<i64>) -> Result<i32, ServiceError> {
        let product_type = match product_type_id {
            Some(id) => self.catalog.find_product_type(id).await?,
            None => None,
        };
        Ok(line_sequence(product_type.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProductCategory;
    use crate::repositories::InMemoryStore;
    use rust_decimal::Decimal;

    fn product_type(id: i64, code: &str) -> ProductType {
        ProductType {
            id,
            name: format!("type-{}", id),
            code: Some(code.to_string()),
            sequence: 1,
        }
    }

    fn category(id: i64, parent_id: Option<i64>, product_type_id: Option<i64>) -> ProductCategory {
        ProductCategory {
            id,
            name: format!("categ-{}", id),
            parent_id,
            product_type_id,
        }
    }

    fn template(categ_id: Option<i64>, product_type_id: Option<i64>) -> ProductTemplate {
        ProductTemplate {
            id: 1,
            name: "Widget".into(),
            default_code: None,
            uom_id: 1,
            categ_id,
            product_type_id,
            standard_price: Decimal::ZERO,
            attribute_value_ids: vec![],
        }
    }

    fn store() -> Arc<InMemoryStore> {
        let store = InMemoryStore::new();
        store.add_product_type(product_type(10, "10"));
        store.add_product_type(product_type(20, "20"));
        store.add_product_type(product_type(30, "RAW"));
        // root(10) <- middle(none) <- leaf(20) <- deepest(none)
        store.add_category(category(1, None, Some(10)));
        store.add_category(category(2, Some(1), None));
        store.add_category(category(3, Some(2), Some(20)));
        store.add_category(category(4, Some(3), None));
        // 5 <-> 6 cycle without any type
        store.add_category(category(5, Some(6), None));
        store.add_category(category(6, Some(5), None));
        Arc::new(store)
    }

    #[tokio::test]
    async fn nearest_category_override_wins() {
        let classifier = ProductClassifier::new(store());
        let resolved = classifier.resolve(&template(Some(4), None)).await.unwrap();
        assert_eq!(resolved.map(|t| t.id), Some(20));

        let resolved = classifier.resolve(&template(Some(2), None)).await.unwrap();
        assert_eq!(resolved.map(|t| t.id), Some(10));
    }

    #[tokio::test]
    async fn template_type_overrides_categories() {
        let classifier = ProductClassifier::new(store());
        let resolved = classifier
            .resolve(&template(Some(4), Some(30)))
            .await
            .unwrap();
        assert_eq!(resolved.map(|t| t.id), Some(30));
    }

    #[tokio::test]
    async fn cyclic_category_chain_terminates() {
        let classifier = ProductClassifier::new(store());
        let resolved = classifier.resolve(&template(Some(5), None)).await.unwrap();
        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn sequence_comes_from_numeric_codes() {
        let classifier = ProductClassifier::new(store());
        assert_eq!(classifier.sequence_for(Some(20)).await.unwrap(), 20);
        assert_eq!(classifier.sequence_for(Some(30)).await.unwrap(), 0);
        assert_eq!(classifier.sequence_for(None).await.unwrap(), 0);
    }
}
