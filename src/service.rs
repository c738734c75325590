//! Calling contract methods by name.

use crate::client::Client;
use crate::descriptor::TypeTag;
use crate::error::Result;
use crate::registry::Registry;
use crate::response::FromResponse;
use crate::value::Arg;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A client bound to one contract.
///
/// Cheap to clone; clones share the client and the method registry.
#[derive(Debug, Clone)]
pub struct Service {
    client: Client,
    registry: Arc<Registry>,
}

impl Service {
    pub fn new(client: Client, registry: Arc<Registry>) -> Self {
        Self { client, registry }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Starts a call to the method named `method`.
    pub fn call(&self, method: &str) -> Call<'_> {
        Call {
            service: self,
            method: method.to_string(),
            parameter_types: None,
            generic_arguments: None,
            args: Vec::new(),
            cancel: None,
        }
    }
}

/// A pending contract call.
///
/// Arguments are positional and must match the resolved method's parameters.
#[must_use = "a call does nothing until it is sent"]
#[derive(Debug)]
pub struct Call<'a> {
    service: &'a Service,
    method: String,
    parameter_types: Option<Vec<TypeTag>>,
    generic_arguments: Option<Vec<TypeTag>>,
    args: Vec<Arg>,
    cancel: Option<CancellationToken>,
}

impl Call<'_> {
    pub fn arg(mut self, arg: impl Into<Arg>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends a value serialized through `serde`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Serialization`] when `value` cannot be represented.
    pub fn arg_serialized<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        self.args.push(Arg::serialize(value)?);
        Ok(self)
    }

    pub fn args(mut self, args: impl IntoIterator<Item = Arg>) -> Self {
        self.args.extend(args);
        self
    }

    /// Parameter types used to pick between overloads.
    pub fn types(mut self, types: impl IntoIterator<Item = TypeTag>) -> Self {
        self.parameter_types = Some(types.into_iter().collect());
        self
    }

    /// Generic arguments for an open generic method.
    pub fn generics(mut self, generics: impl IntoIterator<Item = TypeTag>) -> Self {
        self.generic_arguments = Some(generics.into_iter().collect());
        self
    }

    /// Cancellation for methods without a cancellation parameter. A token
    /// passed as an argument takes precedence.
    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Resolves the method, builds the request and dispatches it.
    pub async fn send<R: FromResponse>(self) -> Result<R> {
        let Call {
            service,
            method,
            parameter_types,
            generic_arguments,
            args,
            cancel,
        } = self;

        let descriptor = service.registry.resolve(
            &method,
            parameter_types.as_deref(),
            generic_arguments.as_deref(),
        )?;
        let (request, from_args) = service.client.build_request(&descriptor, args)?;
        let cancel = from_args.or(cancel).unwrap_or_default();

        service.client.dispatch(&descriptor, request, &cancel).await
    }
}
