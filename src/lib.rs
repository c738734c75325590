//! # Restract - declarative HTTP service contracts
//!
//! Restract turns a statically declared description of a remote service into
//! typed calls. A contract lists methods with their verb, path template and
//! parameter roles; the client builds requests from positional arguments,
//! sends them through a pluggable transport and constructs the result type the
//! caller asks for, including navigable paged and sorted results.
//!
//! ## Quick Start
//!
//! ```no_run
//! use restract::{
//!     BodySerialization, Client, ContractDescriptor, Json, MethodDescriptor, Parameter,
//!     ReturnShape, TypeTag,
//! };
//! use http::Method;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize)]
//! struct CreateUser {
//!     name: String,
//!     email: String,
//! }
//!
//! #[derive(Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), restract::Error> {
//!     let contract = ContractDescriptor::builder("Users")
//!         .method(
//!             MethodDescriptor::builder("Users", "get_user")
//!                 .http(Method::GET, "/users/{id}")
//!                 .param(Parameter::path("id", TypeTag::of::<u64>()))
//!                 .returns(ReturnShape::Value, TypeTag::of::<User>())
//!                 .build()?,
//!         )
//!         .method(
//!             MethodDescriptor::builder("Users", "create_user")
//!                 .http(Method::POST, "/users")
//!                 .param(Parameter::body("user", TypeTag::of::<CreateUser>(), BodySerialization::Json))
//!                 .returns(ReturnShape::Value, TypeTag::of::<User>())
//!                 .build()?,
//!         )
//!         .build()?;
//!
//!     let users = Client::builder()
//!         .base_url("https://api.example.com")?
//!         .build()?
//!         .service(contract);
//!
//!     let user: Json<User> = users.call("get_user").arg(123u64).send().await?;
//!     println!("User: {}", user.name);
//!
//!     let new_user = CreateUser {
//!         name: "Alice".to_string(),
//!         email: "alice@example.com".to_string(),
//!     };
//!     let created: Json<User> = users
//!         .call("create_user")
//!         .arg_serialized(&new_user)?
//!         .send()
//!         .await?;
//!     println!("Created user with ID: {}", created.id);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Declarative contracts** - Path, query, header, body, form and multipart parameters described once
//! - **Overloads and generics** - Methods resolved by name, arity and type tags; generic methods closed and cached
//! - **Return-shape dispatch** - Unit, raw response, bytes, streams, text, values, sequences and envelopes
//! - **Rich error handling** - Remote failures keep status, headers, raw body and the server's error payload
//! - **Navigable results** - Link-header paging, sorting, query-handler pages and in-memory pages
//! - **Pluggable seams** - Transport, content serializer, URL formatter and exception factory are traits
//! - **Cancellation** - Every call honours a `CancellationToken`
//! - **Automatic logging** - Structured logging with `tracing`
//!
//! ## Error Handling
//!
//! ```no_run
//! use restract::{Error, Json, Service};
//!
//! # async fn example(users: Service) -> Result<(), Error> {
//! match users.call("get_user").arg(7u64).send::<Json<serde_json::Value>>().await {
//!     Ok(user) => println!("Success: {:?}", user.0),
//!     Err(Error::RemoteService { status, error_message: Some(message), .. }) => {
//!         eprintln!("{} failed: {:?}", status, message.message);
//!     }
//!     Err(Error::Deserialization { raw_response, source, .. }) => {
//!         eprintln!("Unexpected body {}: {}", raw_response, source);
//!     }
//!     Err(e) if e.is_cancelled() => eprintln!("Cancelled"),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Paging
//!
//! Methods declared with [`ReturnShape::Paged`] return a [`paging::LinkedPage`]
//! that follows the service's `Link` header:
//!
//! ```no_run
//! use restract::paging::{LinkedPage, PagedResult, ResettableResult};
//! use restract::Service;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(items: Service) -> Result<(), restract::Error> {
//! let cancel = CancellationToken::new();
//! let mut page: LinkedPage<String> = items.call("list").send().await?;
//! loop {
//!     println!("page {} of {}: {:?}", page.page(), page.total_pages(), page.items());
//!     match page.get_next(&cancel).await? {
//!         Some(next) => page = next,
//!         None => break,
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod data_source;
pub mod descriptor;
mod error;
pub mod exception;
pub mod format;
pub mod multipart;
pub mod paging;
mod registry;
pub mod request;
pub mod response;
pub mod retry;
pub mod serializer;
mod service;
pub mod transport;
pub mod value;

pub use client::{Client, ClientBuilder};
pub use config::PagingConfig;
pub use data_source::{DataSource, DataSourceEvent};
pub use descriptor::{
    BodySerialization, CollectionFormat, ContractDescriptor, MethodDescriptor, Parameter,
    ParameterRole, QuerySpec, ReturnShape, TypeTag,
};
pub use error::{BoxError, Error, Result};
pub use exception::{ErrorMessage, ExceptionFactory, RemoteServiceExceptionFactory};
pub use multipart::MultipartItem;
pub use registry::Registry;
pub use response::{ApiResponse, FromResponse, Json, RawResponse};
pub use retry::{RetryPredicate, RetryStrategy};
pub use service::{Call, Service};
pub use value::{Arg, Composite, Content, Property, Scalar};
