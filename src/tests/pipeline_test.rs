//! End-to-end retrieval pipeline scenarios.

use chrono::{Duration, Utc};
use std::collections::BTreeMap;

use super::common::*;
use crate::models::{
    AmbiguityType, CatalogSnapshot, DataExistence, DataLayer, RecommendedAction, UpdateFrequency,
};
use crate::services::search::{SearchInput, SearchMode};

fn input(request_id: &str, raw_query: &str, use_case: &str) -> SearchInput {
    SearchInput {
        request_id: request_id.to_string(),
        raw_query: raw_query.to_string(),
        variable_name: None,
        variable_type: None,
        context: BTreeMap::new(),
        use_case: use_case.to_string(),
        search_mode: SearchMode::Auto,
        enable_rerank: false,
    }
}

#[tokio::test]
async fn simple_hit_uses_the_certified_table() {
    let mut snapshot = CatalogSnapshot { generation: 1, ..Default::default() };
    snapshot
        .domains
        .insert("vendas".into(), domain("vendas", "Vendas", &["vendas", "faturamento", "consignado", "varejo"]));
    snapshot.owners.insert(1, owner(1, "Ana Souza", "vendas", 0.8));

    let sales_table = table(
        1,
        "tb_vendas_consig_spec",
        "vendas",
        "Vendas",
        1,
        Some(DataLayer::Spec),
        Some(UpdateFrequency::Monthly),
        Some("consig"),
        Some(Utc::now() - Duration::hours(12)),
        &["vendas", "consignado", "varejo", "mensal", "produto", "segmento"],
    );
    snapshot.tables.insert(1, sales_table.clone());

    let fixture = pipeline_fixture(snapshot).await;
    index_table_from(
        &fixture.retriever,
        &sales_table,
        "Vendas mensais do produto consignado para o segmento varejo",
    )
    .await;
    seed_quality(&fixture.quality, "tb_vendas_consig_spec", 91.0);

    fixture.llm.push(
        r#"{"data_need": "vendas", "target_product": "consig", "target_segment": "varejo",
            "granularity": "mensal", "inferred_domains": ["vendas"]}"#,
    );

    let outcome = fixture
        .service
        .run(input("s1", "vendas mensais consignado varejo", "analytical"))
        .await;

    assert_eq!(outcome.data_existence, DataExistence::Exists);
    assert_eq!(outcome.action, RecommendedAction::UseTable);

    let top = outcome.best_table.as_ref().expect("a table is recommended");
    assert_eq!(top.table.name, "tb_vendas_consig_spec");
    assert!(top.score >= 0.70, "score was {}", top.score);
    assert!(!top.is_double_certified);
    assert!(top.has_product_match);

    assert_eq!(outcome.ambiguity.kind, AmbiguityType::None);
    assert!(!outcome.ambiguity.is_ambiguous);
}

#[tokio::test]
async fn score_tie_across_domains_reports_domain_conflict() {
    let mut snapshot = CatalogSnapshot { generation: 1, ..Default::default() };
    snapshot
        .domains
        .insert("credito".into(), domain("credito", "Crédito", &["receita", "credito"]));
    snapshot.owners.insert(10, owner(10, "Bruno Lima", "credito", 0.7));

    // Both tables pass the retrieval domain filter, but the indexed snapshot
    // places them in different business domains.
    let sales = table(1, "tb_receita", "vendas", "vendas", 10, None, None, None, None, &["receita"]);
    let clients =
        table(2, "tb_receita_cli", "clientes", "clientes", 10, None, None, None, None, &["receita"]);
    snapshot.tables.insert(1, sales.clone());
    snapshot.tables.insert(2, clients.clone());

    let fixture = pipeline_fixture(snapshot).await;
    for info in [&sales, &clients] {
        let mut indexed = info.clone();
        indexed.domain_name = "Crédito".to_string();
        index_table_from(&fixture.retriever, &indexed, "Receita consolidada").await;
    }

    fixture
        .llm
        .push(r#"{"data_need": "receita", "inferred_domains": ["credito"]}"#);

    let outcome = fixture.service.run(input("s2", "receita", "default")).await;

    assert_eq!(outcome.ambiguity.kind, AmbiguityType::DomainConflict);
    assert!(outcome.ambiguity.is_ambiguous);
    assert_eq!(outcome.ambiguity.options.len(), 2);
    assert!(outcome.ambiguity.options.iter().all(|o| o.domain.is_some()));
    assert_eq!(
        outcome.ambiguity.provisional_table_id,
        Some(outcome.matched_tables[0].table.id)
    );
}

#[tokio::test]
async fn multiple_products_in_top_results_are_flagged() {
    let mut snapshot = CatalogSnapshot { generation: 1, ..Default::default() };
    snapshot
        .domains
        .insert("vendas".into(), domain("vendas", "Vendas", &["vendas"]));
    snapshot.owners.insert(1, owner(1, "Ana Souza", "vendas", 0.8));

    let consig = table(
        1,
        "tb_vendas_consig_spec",
        "vendas",
        "Vendas",
        1,
        Some(DataLayer::Spec),
        None,
        Some("consig"),
        None,
        &["vendas", "produto", "consignado"],
    );
    let imob = table(
        2,
        "tb_vendas_imob_spec",
        "vendas",
        "Vendas",
        1,
        Some(DataLayer::Spec),
        None,
        Some("imob"),
        None,
        &["vendas", "produto"],
    );
    snapshot.tables.insert(1, consig.clone());
    snapshot.tables.insert(2, imob.clone());

    let fixture = pipeline_fixture(snapshot).await;
    index_table_from(&fixture.retriever, &consig, "Vendas do produto consignado").await;
    index_table_from(&fixture.retriever, &imob, "Vendas do produto imobiliário").await;
    seed_quality(&fixture.quality, "tb_vendas_consig_spec", 91.0);

    fixture.llm.push(
        r#"{"data_need": "vendas", "target_product": "consignado", "inferred_domains": ["vendas"]}"#,
    );

    let mut search_input = input("s3", "vendas consignado", "default");
    search_input
        .context
        .insert("produto".to_string(), "consignado".to_string());

    let outcome = fixture.service.run(search_input).await;

    assert_eq!(outcome.ambiguity.kind, AmbiguityType::MultipleProducts);
    let labels: Vec<String> = outcome
        .ambiguity
        .options
        .iter()
        .map(|o| o.label.to_lowercase())
        .collect();
    assert!(labels.contains(&"consig".to_string()), "labels: {:?}", labels);
    assert!(labels.contains(&"imob".to_string()), "labels: {:?}", labels);
}

#[tokio::test]
async fn weak_candidates_surface_as_low_confidence() {
    let mut snapshot = CatalogSnapshot { generation: 1, ..Default::default() };
    snapshot
        .domains
        .insert("financas".into(), domain("financas", "Finanças", &["financas"]));
    snapshot.owners.insert(5, owner(5, "Carla Dias", "financas", 0.5));

    // Indexed under the searched domain, but the snapshot places the table
    // elsewhere, so no context boost applies.
    let margin =
        table(1, "tb_margem", "contabilidade", "Contabilidade", 99, None, None, None, None, &["margem"]);
    let mut snapshot_table = margin.clone();
    snapshot_table.owner_id = 5;
    snapshot.tables.insert(1, snapshot_table);
    snapshot.owners.insert(99, owner(99, "Diego Reis", "financas", 0.5));

    let fixture = pipeline_fixture(snapshot).await;
    let mut indexed = margin.clone();
    indexed.domain_name = "Finanças".to_string();
    index_table_from(&fixture.retriever, &indexed, "Margem por centro de custo").await;

    fixture
        .llm
        .push(r#"{"data_need": "margem operacional lucro", "inferred_domains": ["financas"]}"#);

    let outcome = fixture
        .service
        .run(input("s4", "margem operacional lucro", "default"))
        .await;

    let top_score = outcome.matched_tables[0].score;
    assert!(top_score < 0.40, "top score was {}", top_score);
    assert_eq!(outcome.ambiguity.kind, AmbiguityType::LowConfidence);
    assert_eq!(outcome.data_existence, DataExistence::Uncertain);
    assert_eq!(outcome.action, RecommendedAction::ConfirmWithOwner);
}

#[tokio::test]
async fn field_query_activates_column_search_and_boosts_the_table() {
    let mut snapshot = CatalogSnapshot { generation: 1, ..Default::default() };
    snapshot
        .domains
        .insert("clientes".into(), domain("clientes", "Clientes", &["cliente", "cpf"]));
    snapshot.owners.insert(3, owner(3, "Elisa Prado", "clientes", 0.6));

    let clients = table(
        7,
        "tb_clientes",
        "clientes",
        "Clientes",
        3,
        None,
        None,
        None,
        None,
        &["cliente", "cpf", "cadastro"],
    );
    snapshot.tables.insert(7, clients.clone());

    let fixture = pipeline_fixture(snapshot).await;
    index_table_from(&fixture.retriever, &clients, "Cadastro de clientes").await;
    index_column(&fixture.retriever, &clients, "nr_cpf", "nr_cpf", "CPF do cliente").await;

    fixture.llm.push(
        r#"{"data_need": "cpf", "target_entity": "cpf", "inferred_domains": ["clientes"]}"#,
    );

    // Hybrid run: column branch active.
    let outcome = fixture
        .service
        .run(input("s5a", "onde tem o campo CPF?", "default"))
        .await;

    let top = &outcome.matched_tables[0];
    assert_eq!(top.table.id, 7);
    assert!(
        top.matched_entities.contains(&"nr_cpf".to_string()),
        "matched entities: {:?}",
        top.matched_entities
    );

    // Table-only run for comparison (intent comes from the cache now).
    let mut table_only = input("s5b", "onde tem o campo CPF?", "default");
    table_only.search_mode = SearchMode::TableOnly;
    let baseline = fixture.service.run(table_only).await;

    let boosted = top.score;
    let unboosted = baseline.matched_tables[0].score;
    assert!(
        (boosted - (unboosted + 0.15)).abs() < 1e-9,
        "expected +0.15 boost: {} vs {}",
        boosted,
        unboosted
    );
}

#[tokio::test]
async fn retriever_failure_degrades_to_uncertain() {
    // No tables indexed at all: the retriever returns nothing and the
    // pipeline still answers.
    let mut snapshot = CatalogSnapshot { generation: 1, ..Default::default() };
    snapshot
        .domains
        .insert("vendas".into(), domain("vendas", "Vendas", &["vendas"]));
    snapshot.owners.insert(1, owner(1, "Ana Souza", "vendas", 0.8));

    let fixture = pipeline_fixture(snapshot).await;
    fixture
        .llm
        .push(r#"{"data_need": "vendas", "inferred_domains": ["vendas"]}"#);

    let outcome = fixture.service.run(input("s6", "vendas", "default")).await;

    assert!(outcome.matched_tables.is_empty());
    assert_eq!(outcome.data_existence, DataExistence::NeedsCreation);
    assert_eq!(outcome.action, RecommendedAction::CreateInvolvement);
    // Domain and owner are still suggested.
    assert!(!outcome.matched_domains.is_empty());
    assert!(!outcome.matched_owners.is_empty());
}

#[tokio::test]
async fn identical_inputs_produce_identical_output() {
    let mut snapshot = CatalogSnapshot { generation: 1, ..Default::default() };
    snapshot
        .domains
        .insert("vendas".into(), domain("vendas", "Vendas", &["vendas"]));
    snapshot.owners.insert(1, owner(1, "Ana Souza", "vendas", 0.8));

    let sales = table(
        1,
        "tb_vendas",
        "vendas",
        "Vendas",
        1,
        Some(DataLayer::SoT),
        None,
        None,
        None,
        &["vendas"],
    );
    snapshot.tables.insert(1, sales.clone());

    let fixture = pipeline_fixture(snapshot).await;
    index_table_from(&fixture.retriever, &sales, "Vendas consolidadas").await;

    fixture
        .llm
        .push(r#"{"data_need": "vendas", "inferred_domains": ["vendas"]}"#);

    let first = fixture.service.run(input("r1", "vendas", "default")).await;
    // Second run hits the intent cache; catalog unchanged.
    let second = fixture.service.run(input("r2", "vendas", "default")).await;

    assert!(second.intent_cache_hit);
    assert_eq!(first.matched_tables.len(), second.matched_tables.len());
    for (a, b) in first.matched_tables.iter().zip(second.matched_tables.iter()) {
        assert_eq!(a.table.id, b.table.id);
        assert!((a.score - b.score).abs() < 1e-9);
        assert_eq!(a.reasoning, b.reasoning);
    }
}
