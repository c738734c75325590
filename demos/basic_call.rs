//! Basic example declaring a small contract and calling it.
//!
//! This example shows how to:
//! - Describe a service contract once
//! - Make GET requests with path parameters
//! - Make POST requests with a JSON body
//! - Read status and headers through a response envelope
//!
//! Run with: `cargo run --example basic_call`

use http::Method;
use restract::{
    ApiResponse, BodySerialization, Client, ContractDescriptor, Error, Json, MethodDescriptor,
    Parameter, ReturnShape, TypeTag,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Post {
    #[serde(rename = "userId")]
    user_id: u32,
    id: u32,
    title: String,
    body: String,
}

#[derive(Debug, Serialize)]
struct NewPost {
    title: String,
    body: String,
    #[serde(rename = "userId")]
    user_id: u32,
}

fn posts_contract() -> Result<ContractDescriptor, Error> {
    ContractDescriptor::builder("Posts")
        .header("Accept", Some("application/json"))
        .method(
            MethodDescriptor::builder("Posts", "get_post")
                .http(Method::GET, "/posts/{id}")
                .param(Parameter::path("id", TypeTag::of::<u32>()))
                .returns(ReturnShape::Value, TypeTag::of::<Post>())
                .build()?,
        )
        .method(
            MethodDescriptor::builder("Posts", "try_get_post")
                .http(Method::GET, "/posts/{id}")
                .param(Parameter::path("id", TypeTag::of::<u32>()))
                .returns_shape(ReturnShape::Envelope(Box::new(ReturnShape::Value)))
                .build()?,
        )
        .method(
            MethodDescriptor::builder("Posts", "create_post")
                .http(Method::POST, "/posts")
                .param(Parameter::body("post", TypeTag::of::<NewPost>(), BodySerialization::Json))
                .returns(ReturnShape::Value, TypeTag::of::<Post>())
                .build()?,
        )
        .build()
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("restract=debug,basic_call=info")
        .init();

    let posts = Client::builder()
        .base_url("https://jsonplaceholder.typicode.com")?
        .build()?
        .service(posts_contract()?);

    println!("=== GET Request Example ===");
    let post: Json<Post> = posts.call("get_post").arg(1u32).send().await?;
    println!("Post ID: {}", post.id);
    println!("Title: {}", post.title);
    println!();

    println!("=== POST Request Example ===");
    let new_post = NewPost {
        title: "My New Post".to_string(),
        body: "This is the content of my new post!".to_string(),
        user_id: 1,
    };
    let created: Json<Post> = posts
        .call("create_post")
        .arg_serialized(&new_post)?
        .send()
        .await?;
    println!("Created post ID: {}", created.id);
    println!();

    println!("=== Response Envelope Example ===");
    let response: ApiResponse<Json<Post>> = posts.call("try_get_post").arg(100_000u32).send().await?;
    println!("Status code: {}", response.status());
    println!("Content-Type: {:?}", response.header("content-type"));
    println!("Request latency: {:?}", response.latency());
    match response.error() {
        Some(e) => println!("Failed as expected: {}", e),
        None => println!("Unexpected success"),
    }

    Ok(())
}
