//! Product repository for `catalog.products`.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use tillpoint_core::{ProductId, UserId};

use super::RepositoryError;
use crate::models::{Product, ProductDraft, ProductView};
use crate::store::ProductStore;

const VIEW_SELECT: &str = r"
    SELECT p.id, p.seller_id, p.name, p.price, p.stock, p.discount, p.product_type,
           p.description, p.created_at, p.updated_at, p.deleted_at,
           s.name AS seller_name
    FROM catalog.products p
    LEFT JOIN catalog.sellers s ON s.id = p.seller_id
    WHERE p.deleted_at IS NULL
";

const PRODUCT_COLUMNS: &str = "id, seller_id, name, price, stock, discount, product_type, \
                               description, created_at, updated_at, deleted_at";

/// `PostgreSQL` implementation of [`ProductStore`].
#[derive(Debug, Clone)]
pub struct PgProductStore {
    pool: PgPool,
}

impl PgProductStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Work out why a conditional stock update matched no row.
pub(super) async fn stock_miss<'e, E>(executor: E, id: ProductId) -> RepositoryError
where
    E: sqlx::PgExecutor<'e>,
{
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM catalog.products WHERE id = $1 AND deleted_at IS NULL)",
    )
    .bind(id)
    .fetch_one(executor)
    .await;

    match exists {
        Ok(true) => RepositoryError::InsufficientStock(id),
        Ok(false) => RepositoryError::NotFound,
        Err(e) => RepositoryError::Database(e),
    }
}

#[async_trait]
impl ProductStore for PgProductStore {
    async fn find(&self, id: ProductId) -> Result<Option<ProductView>, RepositoryError> {
        let query = format!("{VIEW_SELECT} AND p.id = $1");
        let view = sqlx::query_as::<_, ProductView>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(view)
    }

    async fn find_many(&self, ids: &[ProductId]) -> Result<Vec<ProductView>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = ids.iter().map(ProductId::as_uuid).collect();
        let query = format!("{VIEW_SELECT} AND p.id = ANY($1) ORDER BY p.created_at, p.id");
        let views = sqlx::query_as::<_, ProductView>(&query)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(views)
    }

    async fn list_all(&self) -> Result<Vec<ProductView>, RepositoryError> {
        let query = format!("{VIEW_SELECT} ORDER BY p.created_at, p.id");
        let views = sqlx::query_as::<_, ProductView>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(views)
    }

    async fn list_by_seller(
        &self,
        seller_id: UserId,
    ) -> Result<Vec<ProductView>, RepositoryError> {
        let query = format!("{VIEW_SELECT} AND p.seller_id = $1 ORDER BY p.created_at, p.id");
        let views = sqlx::query_as::<_, ProductView>(&query)
            .bind(seller_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(views)
    }

    async fn search_by_name(&self, query: &str) -> Result<Vec<ProductView>, RepositoryError> {
        let sql = format!(
            "{VIEW_SELECT} AND p.name ILIKE '%' || $1 || '%' ESCAPE '\\' \
             ORDER BY p.created_at, p.id"
        );
        let pattern = escape_like(query);
        let views = sqlx::query_as::<_, ProductView>(&sql)
            .bind(pattern)
            .fetch_all(&self.pool)
            .await?;
        Ok(views)
    }

    async fn insert(
        &self,
        seller_id: UserId,
        seller_name: &str,
        draft: &ProductDraft,
    ) -> Result<ProductView, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            INSERT INTO catalog.sellers (id, name)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
            ",
        )
        .bind(seller_id)
        .bind(seller_name)
        .execute(&mut *tx)
        .await?;

        let query = format!(
            r"
            INSERT INTO catalog.products
                (id, seller_id, name, price, stock, discount, product_type, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {PRODUCT_COLUMNS}
            "
        );
        let product = sqlx::query_as::<_, Product>(&query)
            .bind(ProductId::generate())
            .bind(seller_id)
            .bind(&draft.name)
            .bind(draft.price)
            .bind(draft.stock)
            .bind(draft.discount)
            .bind(&draft.product_type)
            .bind(&draft.description)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(ProductView {
            product,
            seller_name: Some(seller_name.to_owned()),
        })
    }

    async fn update(
        &self,
        id: ProductId,
        draft: &ProductDraft,
    ) -> Result<ProductView, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE catalog.products
            SET name = $2, price = $3, stock = $4, discount = $5,
                product_type = $6, description = $7, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            ",
        )
        .bind(id)
        .bind(&draft.name)
        .bind(draft.price)
        .bind(draft.stock)
        .bind(draft.discount)
        .bind(&draft.product_type)
        .bind(&draft.description)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        self.find(id).await?.ok_or(RepositoryError::NotFound)
    }

    async fn soft_delete(&self, id: ProductId) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE catalog.products
            SET deleted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            ",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn adjust_stock(&self, id: ProductId, delta: i32) -> Result<i32, RepositoryError> {
        let stock = sqlx::query_scalar::<_, i32>(
            r"
            UPDATE catalog.products
            SET stock = stock + $2, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL AND stock + $2 >= 0
            RETURNING stock
            ",
        )
        .bind(id)
        .bind(delta)
        .fetch_optional(&self.pool)
        .await?;

        match stock {
            Some(stock) => Ok(stock),
            None => Err(stock_miss(&self.pool, id).await),
        }
    }
}

/// Escape `LIKE` metacharacters so the query matches literally.
fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
