//! Model, column and view repositories read through the entity cache.

mod common;

use architect_meta::meta::{
    Column, ColumnKind, ColumnOptions, Container, FormulaOptions, MetaTable, Model, SelectOption, ViewKind,
};
use architect_meta::model::{ColumnPatch, NewColumn, NewModel, NewView};
use architect_meta::{ManyToManyRequest, MetaError};
use common::{titles, Harness};

fn option(title: &str) -> SelectOption {
    SelectOption {
        id: String::new(),
        fk_column_id: String::new(),
        title: title.to_string(),
        color: None,
        order: None,
    }
}

// ============================================================================
// Cache behaviour
// ============================================================================

#[tokio::test]
async fn model_list_is_unknown_then_known_empty_then_cached() {
    let h = Harness::new();

    let before = h.ctx.cache.get_list::<Model>(&["base_test"]).await;
    assert!(!before.is_known_empty);
    assert!(before.list.is_empty());

    assert!(h.ctx.models().list().await.unwrap().is_empty());
    let after = h.ctx.cache.get_list::<Model>(&["base_test"]).await;
    assert!(after.is_known_empty);

    let reads = h.store.reads();
    assert!(h.ctx.models().list().await.unwrap().is_empty());
    assert_eq!(h.store.reads(), reads);

    let orders = h.table("Orders", "orders").await;
    let listed = h.ctx.models().list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, orders.id);
}

#[tokio::test]
async fn repeated_reads_are_served_from_cache() {
    let h = Harness::new();
    let orders = h.table("Orders", "orders").await;

    h.ctx.models().get_with_info(&orders.id).await.unwrap();
    let reads = h.store.reads();
    let again = h.ctx.models().get_with_info(&orders.id).await.unwrap().unwrap();
    assert_eq!(h.store.reads(), reads);
    assert_eq!(titles(&again), vec!["Id", "Name"]);
    assert_eq!(again.views.len(), 1);
}

#[tokio::test]
async fn alias_lookup_resolves_id_title_and_table_name() {
    let h = Harness::new();
    let orders = h.table("Orders", "orders").await;

    for alias in [orders.id.as_str(), "Orders", "orders"] {
        let found = h.ctx.models().get_by_alias_or_id(alias).await.unwrap().unwrap();
        assert_eq!(found.id, orders.id);
    }
    assert!(h
        .ctx
        .models()
        .get_by_alias_or_id("Missing")
        .await
        .unwrap()
        .is_none());

    // let the detached alias writes land
    for _ in 0..3 {
        tokio::task::yield_now().await;
    }
    let reads = h.store.reads();
    let found = h.ctx.models().get_by_alias_or_id("Orders").await.unwrap().unwrap();
    assert_eq!(found.id, orders.id);
    assert_eq!(h.store.reads(), reads);
}

#[tokio::test]
async fn alias_named_list_leaves_the_model_list_cached() {
    let h = Harness::new();
    let list = h.table("list", "list").await;
    h.ctx.models().list().await.unwrap();

    let found = h.ctx.models().get_by_alias_or_id("list").await.unwrap().unwrap();
    assert_eq!(found.id, list.id);
    for _ in 0..3 {
        tokio::task::yield_now().await;
    }

    let reads = h.store.reads();
    let models = h.ctx.models().list().await.unwrap();
    assert_eq!(models.len(), 1);
    assert_eq!(h.store.reads(), reads);
}

#[tokio::test]
async fn renaming_clears_old_aliases() {
    let h = Harness::new();
    let orders = h.table("Orders", "orders").await;
    h.table("Invoices", "invoices").await;
    h.ctx.models().get_by_alias_or_id("Orders").await.unwrap();
    for _ in 0..3 {
        tokio::task::yield_now().await;
    }

    let renamed = h
        .ctx
        .models()
        .update_alias_and_table_name(&orders.id, "Purchases", "purchases")
        .await
        .unwrap();
    assert_eq!(renamed.title, "Purchases");
    assert!(h.ctx.models().get_by_alias_or_id("Orders").await.unwrap().is_none());
    assert_eq!(
        h.ctx
            .models()
            .get_by_alias_or_id("purchases")
            .await
            .unwrap()
            .unwrap()
            .id,
        orders.id
    );

    let err = h
        .ctx
        .models()
        .update_alias_and_table_name(&orders.id, "Invoices", "purchases")
        .await
        .unwrap_err();
    assert!(matches!(err, MetaError::Validation(_)));
}

#[tokio::test]
async fn containers_do_not_share_models() {
    let h = Harness::new();
    h.table("Orders", "orders").await;

    let other = h.ctx.for_container(Container::new("ws_test", "base_other"));
    assert!(other.models().list().await.unwrap().is_empty());
    assert!(other
        .models()
        .is_table_name_available("orders", None)
        .await
        .unwrap());
    assert!(!h
        .ctx
        .models()
        .is_table_name_available("orders", None)
        .await
        .unwrap());
}

// ============================================================================
// Models
// ============================================================================

#[tokio::test]
async fn duplicate_model_names_are_rejected() {
    let h = Harness::new();
    h.table("Orders", "orders").await;

    let err = h
        .ctx
        .models()
        .insert(NewModel::new("Other", "orders"))
        .await
        .unwrap_err();
    assert!(matches!(err, MetaError::Validation(_)));
    let err = h
        .ctx
        .models()
        .insert(NewModel::new("Orders", "other"))
        .await
        .unwrap_err();
    assert!(matches!(err, MetaError::Validation(_)));
}

#[tokio::test]
async fn models_list_in_order() {
    let h = Harness::new();
    let a = h.table("A", "a").await;
    let b = h.table("B", "b").await;
    let c = h.table("C", "c").await;
    h.ctx.models().update_order(&a.id, 10.0).await.unwrap();
    h.ctx.models().clear(&a.id).await;

    let ids: Vec<_> = h
        .ctx
        .models()
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(ids.len(), 3);
    assert_eq!(ids[0], b.id);
    assert_eq!(ids[1], c.id);
}

#[tokio::test]
async fn display_value_falls_back_to_column_after_primary_key() {
    let h = Harness::new();
    let notes = h
        .ctx
        .models()
        .insert(NewModel::new("Notes", "notes").with_columns(vec![
            NewColumn::primary_key("Id", "id", "integer"),
            NewColumn::physical("Title", "title", "text"),
            NewColumn::physical("Body", "body", "text"),
        ]))
        .await
        .unwrap();
    assert_eq!(notes.display_value().unwrap().title, "Title");
}

#[tokio::test]
async fn primary_column_moves() {
    let h = Harness::new();
    let contacts = h.table("Contacts", "contacts").await;
    let other = h.table("Other", "other").await;
    let email = h
        .ctx
        .columns()
        .insert(&contacts.id, NewColumn::physical("Email", "email", "text"))
        .await
        .unwrap();

    h.ctx
        .models()
        .update_primary_column(&contacts.id, &email.id)
        .await
        .unwrap();
    let contacts = h.model(&contacts.id).await;
    assert_eq!(contacts.display_value().unwrap().id, email.id);
    assert_eq!(contacts.columns.iter().filter(|c| c.pv).count(), 1);

    let foreign = other.column_by_title("Name").unwrap();
    let err = h
        .ctx
        .models()
        .update_primary_column(&contacts.id, &foreign.id)
        .await
        .unwrap_err();
    assert!(matches!(err, MetaError::Validation(_)));
}

#[tokio::test]
async fn deleting_a_model_removes_everything_under_it() {
    let h = Harness::new();
    let tasks = h
        .ctx
        .models()
        .insert(NewModel::new("Tasks", "tasks").with_columns(vec![
            NewColumn::primary_key("Id", "id", "integer"),
            NewColumn::physical("Name", "name", "text").display_value(),
            NewColumn::select("Status", "status", false, vec![option("Open"), option("Done")]),
            NewColumn::with_options(
                "Shout",
                ColumnKind::Formula,
                ColumnOptions::Formula(FormulaOptions {
                    fk_column_id: String::new(),
                    formula: "UPPER({Name})".into(),
                }),
            ),
        ]))
        .await
        .unwrap();
    h.ctx
        .views()
        .insert(NewView {
            fk_model_id: tasks.id.clone(),
            title: "Intake".into(),
            kind: ViewKind::Form,
            is_default: false,
        })
        .await
        .unwrap();
    assert_eq!(h.rows(MetaTable::ColSelectOptions).await.len(), 2);
    assert_eq!(h.rows(MetaTable::ViewColumns).await.len(), 8);
    let status = tasks.column_by_title("Status").unwrap().clone();

    h.ctx.models().delete(&tasks.id).await.unwrap();

    for table in [
        MetaTable::Models,
        MetaTable::Columns,
        MetaTable::ColSelectOptions,
        MetaTable::ColFormula,
        MetaTable::Views,
        MetaTable::ViewColumns,
    ] {
        assert!(h.rows(table).await.is_empty(), "{} not empty", table.name());
    }
    assert!(h.ctx.models().get(&tasks.id).await.unwrap().is_none());
    assert!(h.ctx.columns().get(&status.id).await.unwrap().is_none());
    assert!(h.ctx.models().get_by_alias_or_id("Tasks").await.unwrap().is_none());
    assert!(h.ctx.models().list().await.unwrap().is_empty());

    let err = h.ctx.models().delete(&tasks.id).await.unwrap_err();
    assert!(matches!(err, MetaError::NotFound { .. }));
}

// ============================================================================
// Columns and views
// ============================================================================

#[tokio::test]
async fn column_names_stay_unique() {
    let h = Harness::new();
    let orders = h.table("Orders", "orders").await;

    let dup_title = h
        .ctx
        .columns()
        .insert(&orders.id, NewColumn::physical("Name", "other", "text"))
        .await
        .unwrap_err();
    assert!(matches!(dup_title, MetaError::Validation(_)));
    let dup_name = h
        .ctx
        .columns()
        .insert(&orders.id, NewColumn::physical("Other", "name", "text"))
        .await
        .unwrap_err();
    assert!(matches!(dup_name, MetaError::Validation(_)));

    let name = orders.column_by_title("Name").unwrap();
    let err = h
        .ctx
        .columns()
        .update(
            &name.id,
            ColumnPatch {
                title: Some("Id".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MetaError::Validation(_)));

    let renamed = h
        .ctx
        .columns()
        .update(
            &name.id,
            ColumnPatch {
                title: Some("Label".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.title, "Label");
    assert_eq!(titles(&h.model(&orders.id).await), vec!["Id", "Label"]);
}

#[tokio::test]
async fn physical_columns_need_a_name() {
    let h = Harness::new();
    let orders = h.table("Orders", "orders").await;

    let err = h
        .ctx
        .columns()
        .insert(&orders.id, NewColumn::physical("Blank", "  ", "text"))
        .await
        .unwrap_err();
    assert!(matches!(err, MetaError::Validation(_)));
}

#[tokio::test]
async fn new_display_value_column_takes_the_flag() {
    let h = Harness::new();
    let orders = h.table("Orders", "orders").await;

    let code = h
        .ctx
        .columns()
        .insert(&orders.id, NewColumn::physical("Code", "code", "text").display_value())
        .await
        .unwrap();
    let orders = h.model(&orders.id).await;
    assert_eq!(orders.display_value().unwrap().id, code.id);
    assert!(!orders.column_by_title("Name").unwrap().pv);
}

#[tokio::test]
async fn select_options_load_in_order() {
    let h = Harness::new();
    let orders = h.table("Orders", "orders").await;
    let status = h
        .ctx
        .columns()
        .insert(
            &orders.id,
            NewColumn::select("Status", "status", true, vec![option("New"), option("Paid")]),
        )
        .await
        .unwrap();

    let option_ids = match h.ctx.columns().options(&status).await.unwrap() {
        ColumnOptions::SelectOptions(options) => {
            let names: Vec<_> = options.iter().map(|o| o.title.as_str()).collect();
            assert_eq!(names, vec!["New", "Paid"]);
            options.into_iter().map(|o| o.id).collect::<Vec<_>>()
        }
        other => panic!("unexpected options {:?}", other),
    };
    for id in &option_ids {
        let key = format!("col_select_option:{}", id);
        assert!(h.ctx.cache.get::<SelectOption>(&key).await.is_some());
    }

    h.ctx.columns().delete(&status.id).await.unwrap();
    assert!(h.rows(MetaTable::ColSelectOptions).await.is_empty());
    for id in &option_ids {
        let key = format!("col_select_option:{}", id);
        assert!(h.ctx.cache.get::<SelectOption>(&key).await.is_none());
    }
    let list = h.ctx.cache.get_list::<SelectOption>(&[status.id.as_str()]).await;
    assert!(!list.is_loaded());
}

#[tokio::test]
async fn clearing_a_model_evicts_its_cached_columns() {
    let h = Harness::new();
    let orders = h.table("Orders", "orders").await;
    let columns = h.ctx.columns().list(&orders.id).await.unwrap();
    assert!(!columns.is_empty());
    for c in &columns {
        assert!(h.ctx.cache.get::<Column>(&format!("column:{}", c.id)).await.is_some());
    }

    h.ctx.models().clear(&orders.id).await;

    for c in &columns {
        assert!(h.ctx.cache.get::<Column>(&format!("column:{}", c.id)).await.is_none());
    }
    assert!(!h.ctx.cache.get_list::<Column>(&[orders.id.as_str()]).await.is_loaded());
}

#[tokio::test]
async fn system_columns_are_hidden_in_views() {
    let h = Harness::new();
    let products = h.table("Products", "products").await;
    let tags = h.table("Tags", "tags").await;
    let mm = h
        .ctx
        .relations()
        .create_many_to_many(ManyToManyRequest::new(&products.id, &tags.id))
        .await
        .unwrap();

    let products = h.model(&products.id).await;
    let view = products.views[0].clone();
    for vc in h.ctx.views().columns(&view.id).await.unwrap() {
        let column = products.column(&vc.fk_column_id).unwrap();
        assert_eq!(vc.show, !column.system, "{}", column.title);
    }

    h.ctx
        .views()
        .set_column_visibility(&view.id, &mm.left.id, false)
        .await
        .unwrap();
    let hidden = h
        .ctx
        .views()
        .columns(&view.id)
        .await
        .unwrap()
        .into_iter()
        .find(|vc| vc.fk_column_id == mm.left.id)
        .unwrap();
    assert!(!hidden.show);

    let err = h
        .ctx
        .views()
        .set_column_visibility(&view.id, "cl_missing", true)
        .await
        .unwrap_err();
    assert!(matches!(err, MetaError::NotFound { .. }));
}
