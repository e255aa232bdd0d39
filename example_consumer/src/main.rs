//! Example consumer: wires architect-meta to PostgreSQL and walks a relation lifecycle.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Requires `DATABASE_URL`; see the library's `Settings` for the other variables.

use architect_meta::relation::PhysicalSteps;
use architect_meta::schema::{PhysicalColumn, TableSpec};
use architect_meta::{
    ensure_cache_table, ensure_database_exists, ensure_meta_tables, init_tracing, CacheKind,
    Container, LinkRequest, ManyToManyRequest, MetaContext, MetaError, Model, NewColumn, NewModel,
    Settings,
};

/// Load a model by title, or create it together with its physical table.
async fn ensure_model(ctx: &MetaContext, title: &str, table: &str, pk: &str) -> Result<Model, MetaError> {
    if let Some(existing) = ctx.models().get_by_alias_or_id(title).await? {
        return ctx
            .models()
            .get_with_info(&existing.id)
            .await?
            .ok_or_else(|| MetaError::not_found("model", existing.id));
    }
    PhysicalSteps::new(ctx.schema.as_ref())
        .create_table(&TableSpec {
            name: table.to_string(),
            columns: vec![
                PhysicalColumn::key(pk, "bigint"),
                PhysicalColumn::nullable("name", "text"),
            ],
        })
        .await;
    ctx.models()
        .insert(NewModel::new(title, table).with_columns(vec![
            NewColumn::primary_key("Id", pk, "bigint"),
            NewColumn::physical("Name", "name", "text").display_value(),
        ]))
        .await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("architect_meta=info,example_consumer=info");
    let settings = Settings::from_env()?;

    ensure_database_exists(&settings.database_url).await?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.database_url)
        .await?;
    ensure_meta_tables(&pool, &settings.meta_schema).await?;
    if settings.cache == CacheKind::Postgres {
        ensure_cache_table(&pool, &settings.meta_schema).await?;
    }

    let ctx = MetaContext::postgres(pool, &settings, Container::new("ws_demo", "base_demo"))
        .with_actor("example-consumer");

    let customers = ensure_model(&ctx, "Customers", "customers", "customer_id").await?;
    let orders = ensure_model(&ctx, "Orders", "orders", "order_id").await?;
    let link = ctx
        .relations()
        .create(LinkRequest::has_many(&customers.id, &orders.id))
        .await?;
    tracing::info!(
        has_many = %link.has_many.title,
        belongs_to = %link.belongs_to.title,
        fk = ?link.foreign_key.column_name,
        "linked customers and orders"
    );

    let products = ensure_model(&ctx, "Products", "products", "product_id").await?;
    let tags = ensure_model(&ctx, "Tags", "tags", "tag_id").await?;
    let mm = ctx
        .relations()
        .create_many_to_many(ManyToManyRequest::new(&products.id, &tags.id))
        .await?;
    tracing::info!(
        junction = %mm.junction.table_name,
        left = %mm.left.title,
        right = %mm.right.title,
        "linked products and tags"
    );

    ctx.relations().delete(&link.has_many.id).await?;
    ctx.relations().delete(&mm.left.id).await?;
    tracing::info!("relations removed");
    Ok(())
}
