//! Paging example following a service's `Link` headers.
//!
//! This example shows how to:
//! - Map the service's page query keys with `PagingConfig`
//! - Walk a `LinkedPage` forward and jump to the last page
//! - Drive a `DataSource` and observe its events
//!
//! Run with: `cargo run --example paging`

use http::Method;
use restract::paging::{LinkedPage, PagedResult, ResettableResult};
use restract::{
    Client, ContractDescriptor, DataSource, Error, MethodDescriptor, PagingConfig, Parameter,
    ReturnShape, TypeTag,
};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
struct Comment {
    id: u32,
    email: String,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("restract=debug,paging=info")
        .init();

    let contract = ContractDescriptor::builder("Comments")
        .method(
            MethodDescriptor::builder("Comments", "list")
                .http(Method::GET, "/comments")
                .param(Parameter::query("_page", TypeTag::of::<u32>()))
                .param(Parameter::query("_limit", TypeTag::of::<u32>()))
                .returns(ReturnShape::Paged, TypeTag::of::<Comment>())
                .build()?,
        )
        .build()?;

    let comments = Client::builder()
        .base_url("https://jsonplaceholder.typicode.com")?
        .paging(
            PagingConfig::default()
                .with_page_key("_page")
                .with_page_size_key("_limit"),
        )
        .build()?
        .service(contract);

    let cancel = CancellationToken::new();

    println!("=== Link Navigation ===");
    let mut page: LinkedPage<Comment> = comments.call("list").arg(1u32).arg(100u32).send().await?;
    for _ in 0..2 {
        println!(
            "Page {} of {} ({} items, {} total)",
            page.page(),
            page.total_pages(),
            page.items().len(),
            page.total_count()
        );
        match page.get_next(&cancel).await? {
            Some(next) => page = next,
            None => break,
        }
    }
    if let Some(last) = page.get_last(&cancel).await? {
        println!("Last page is {} with {} items", last.page(), last.items().len());
    }
    println!();

    println!("=== Data Source ===");
    let source = DataSource::new(page);
    let mut events = source.subscribe();
    source.move_first(&cancel).await?;
    source.move_to(3, &cancel).await?;
    while let Ok(event) = events.try_recv() {
        println!("Event: {:?}", event);
    }
    if let Some(current) = source.current() {
        println!("Now showing page {}", current.page());
    }

    Ok(())
}
