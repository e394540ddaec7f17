//! Dynamically typed messages.
//!
//! Messages are type-erased behind [`Message`] and matched by their exact
//! [`ImplId`]. There is no subtype relation: a rule or hook bound to `String`
//! never sees an `i64`, and the other way around.

use std::{any::Any, fmt::Debug};

use hive_macros::impl_id;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    address::Address,
    base::{ImplId, TypeTag},
    registry::{MESSAGE_REGISTRY, deserialize_tagged, serialize_tagged},
};

/// A value that can be sent between actors.
///
/// Implement with `#[impl_id("<uuid>")] impl Message for MyMsg {}`; the
/// attribute supplies every method. The type must also be
/// `Clone + Serialize + Deserialize`.
pub trait Message: Debug + Send + erased_serde::Serialize + 'static {
    #[doc(hidden)]
    fn __impl_id(&self) -> ImplId;

    #[doc(hidden)]
    fn __erased(&self) -> &dyn erased_serde::Serialize;

    #[doc(hidden)]
    fn __clone_box(&self) -> Box<dyn Message>;

    #[doc(hidden)]
    fn __as_any(&self) -> &dyn Any;

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// A message in transit between two addresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub source: Address,
    pub destination: Address,
    pub message: Box<dyn Message>,
}

// Implementations

impl dyn Message {
    pub fn impl_id(&self) -> ImplId {
        self.__impl_id()
    }

    pub fn is<T: Message + TypeTag>(&self) -> bool {
        self.__impl_id() == T::IMPL_ID
    }

    pub fn downcast_ref<T: Message>(&self) -> Option<&T> {
        self.__as_any().downcast_ref::<T>()
    }
}

impl Clone for Box<dyn Message> {
    fn clone(&self) -> Self {
        self.__clone_box()
    }
}

impl Serialize for dyn Message {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serialize_tagged(self.__impl_id(), self.__erased(), serializer)
    }
}

impl<'de> Deserialize<'de> for Box<dyn Message> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserialize_tagged(&MESSAGE_REGISTRY, deserializer)
    }
}

impl Envelope {
    pub fn new(source: Address, destination: Address, message: impl Message) -> Self {
        Self {
            source,
            destination,
            message: Box::new(message),
        }
    }

    pub fn boxed(source: Address, destination: Address, message: Box<dyn Message>) -> Self {
        Self {
            source,
            destination,
            message,
        }
    }
}

#[impl_id("0b6f1f44-3a8e-4f3a-9d64-6d1a2f1b0c01")]
impl Message for String {}

#[impl_id("0b6f1f44-3a8e-4f3a-9d64-6d1a2f1b0c02")]
impl Message for bool {}

#[impl_id("0b6f1f44-3a8e-4f3a-9d64-6d1a2f1b0c03")]
impl Message for i32 {}

#[impl_id("0b6f1f44-3a8e-4f3a-9d64-6d1a2f1b0c04")]
impl Message for i64 {}

#[impl_id("0b6f1f44-3a8e-4f3a-9d64-6d1a2f1b0c05")]
impl Message for u32 {}

#[impl_id("0b6f1f44-3a8e-4f3a-9d64-6d1a2f1b0c06")]
impl Message for u64 {}

#[impl_id("0b6f1f44-3a8e-4f3a-9d64-6d1a2f1b0c07")]
impl Message for f64 {}

#[impl_id("0b6f1f44-3a8e-4f3a-9d64-6d1a2f1b0c08")]
impl Message for Vec<u8> {}
