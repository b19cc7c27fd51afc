use num_derive::{FromPrimitive, ToPrimitive};

use super::stream::TransportStreamAccessor;
use crate::{
  memory::{align8, MemoryAccessor, MemoryOffset},
  result::{AccessResult, TransportResult},
  structure::ObjectUuid,
};

/// Fixed frame header: `[byteCount:4][type:4][timestamp:8]`.
pub const CHANGE_EVENT_HEADER_BYTE_COUNT: usize = 16;

static_assertions::const_assert_eq!(CHANGE_EVENT_HEADER_BYTE_COUNT % 8, 0);

/// Discriminant of a change-event frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum ChangeType {
  CreateObject = 0,
  UpdateObject = 1,
  DeleteObject = 2,
  Message = 3,
  RequestFullUpdate = 4,
  Shutdown = 5,
}

impl ChangeType {
  /// Payload bytes that come before the type's variable change data.
  pub const fn fixed_payload_byte_count(self) -> usize {
    match self {
      ChangeType::CreateObject | ChangeType::DeleteObject => 20, // collectionId + objectId
      ChangeType::UpdateObject => 28, // collectionId + objectId + fieldsChanged
      ChangeType::Message => 24,      // collectionId + objectId + messageType
      ChangeType::RequestFullUpdate => 8, // collectionIdMask
      ChangeType::Shutdown => 0,
    }
  }
}

/// Exact frame size on the wire for an event of `kind` carrying
/// `change_byte_count` bytes of variable data. Writers reserve exactly this
/// much; the testable contract is that they then write exactly this much.
pub const fn size_of_frame(kind: ChangeType, change_byte_count: usize) -> usize {
  align8(CHANGE_EVENT_HEADER_BYTE_COUNT + kind.fixed_payload_byte_count() + change_byte_count)
}

/// A parsed frame handed to the consumer sink. `payload` is a window over
/// everything after the 16-byte frame header (trailing alignment padding
/// included); it is only valid for the duration of the sink call.
pub struct ChangeEvent {
  pub kind_raw: u32,
  pub byte_count: u32,
  pub timestamp: u64,
  pub payload: MemoryAccessor,
}

impl ChangeEvent {
  pub fn kind(&self) -> Option<ChangeType> {
    num_traits::FromPrimitive::from_u32(self.kind_raw)
  }
}

/// Typed view over a frame payload. `FIXED_BYTE_COUNT` is the size of the
/// addressing fields the view owns; the variable change data follows.
pub trait ChangeEventView: Sized {
  const FIXED_BYTE_COUNT: usize;

  fn wrap(payload: MemoryAccessor) -> Self;
}

// Offsets below are within the payload window (frame byte 16 onward):
// collectionId at 0, objectId at 4, then the per-type tail field.

/// Payload view for events with no fixed fields (Shutdown).
pub struct BareChangeEventAccessor {
  payload: MemoryAccessor,
}

impl ChangeEventView for BareChangeEventAccessor {
  const FIXED_BYTE_COUNT: usize = 0;

  fn wrap(payload: MemoryAccessor) -> Self {
    Self { payload }
  }
}

impl BareChangeEventAccessor {
  pub fn payload(&self) -> &MemoryAccessor {
    &self.payload
  }

  /// Reserves a Shutdown frame.
  pub fn shutdown(accessor: &mut TransportStreamAccessor<'_>) -> TransportResult<Self> {
    accessor.write_change_event::<Self>(ChangeType::Shutdown, 0, None)
  }
}

/// Create/Delete payload: `collectionId:4, objectId:16`.
#[derive(Debug)]
pub struct CollectionChangeEventAccessor {
  payload: MemoryAccessor,
}

/// Update payload: `collectionId:4, objectId:16, fieldsChanged:8`.
#[derive(Debug)]
pub struct CollectionUpdateEventAccessor {
  payload: MemoryAccessor,
}

/// Message payload: `collectionId:4, objectId:16, messageType:4`.
#[derive(Debug)]
pub struct CollectionMessageEventAccessor {
  payload: MemoryAccessor,
}

/// RequestFullUpdate payload: `collectionIdMask:8`.
#[derive(Debug)]
pub struct FullUpdateRequestEventAccessor {
  payload: MemoryAccessor,
}

impl ChangeEventView for CollectionChangeEventAccessor {
  const FIXED_BYTE_COUNT: usize = 20;

  fn wrap(payload: MemoryAccessor) -> Self {
    Self { payload }
  }
}

impl ChangeEventView for CollectionUpdateEventAccessor {
  const FIXED_BYTE_COUNT: usize = 28;

  fn wrap(payload: MemoryAccessor) -> Self {
    Self { payload }
  }
}

impl ChangeEventView for CollectionMessageEventAccessor {
  const FIXED_BYTE_COUNT: usize = 24;

  fn wrap(payload: MemoryAccessor) -> Self {
    Self { payload }
  }
}

impl ChangeEventView for FullUpdateRequestEventAccessor {
  const FIXED_BYTE_COUNT: usize = 8;

  fn wrap(payload: MemoryAccessor) -> Self {
    Self { payload }
  }
}

static_assertions::const_assert_eq!(
  CollectionChangeEventAccessor::FIXED_BYTE_COUNT,
  ChangeType::CreateObject.fixed_payload_byte_count()
);
static_assertions::const_assert_eq!(
  CollectionUpdateEventAccessor::FIXED_BYTE_COUNT,
  ChangeType::UpdateObject.fixed_payload_byte_count()
);
static_assertions::const_assert_eq!(
  CollectionMessageEventAccessor::FIXED_BYTE_COUNT,
  ChangeType::Message.fixed_payload_byte_count()
);

macro_rules! impl_addressed_view {
  ($ty:ty) => {
    impl $ty {
      pub fn collection_id(&self) -> AccessResult<i32> {
        self.payload.read_value(&mut MemoryOffset(0))
      }

      pub fn object_id(&self) -> AccessResult<ObjectUuid> {
        self.payload.read_value(&mut MemoryOffset(4))
      }

      pub fn set_collection_id(&self, collection_id: i32) -> AccessResult<()> {
        self.payload.write_value(&collection_id, &mut MemoryOffset(0))
      }

      pub fn set_object_id(&self, id: &ObjectUuid) -> AccessResult<()> {
        self.payload.write_value(id, &mut MemoryOffset(4))
      }

      /// Window over the variable change data after the fixed fields.
      pub fn change_data(&self) -> AccessResult<MemoryAccessor> {
        self.payload.slice_from(<$ty as ChangeEventView>::FIXED_BYTE_COUNT)
      }
    }
  };
}

impl_addressed_view!(CollectionChangeEventAccessor);
impl_addressed_view!(CollectionUpdateEventAccessor);
impl_addressed_view!(CollectionMessageEventAccessor);

impl CollectionChangeEventAccessor {
  /// Reserves a Create frame and fills in its addressing fields. The
  /// returned accessor's [`change_data`] window carries all field values in
  /// declared order.
  ///
  /// [`change_data`]: Self::change_data
  pub fn create(
    accessor: &mut TransportStreamAccessor<'_>,
    collection_id: i32,
    id: &ObjectUuid,
    change_byte_count: usize,
    timestamp: u64,
  ) -> TransportResult<Self> {
    let ev = accessor.write_change_event::<Self>(
      ChangeType::CreateObject,
      change_byte_count,
      Some(timestamp),
    )?;
    ev.set_collection_id(collection_id)?;
    ev.set_object_id(id)?;
    Ok(ev)
  }

  /// Reserves a Delete frame.
  pub fn delete(
    accessor: &mut TransportStreamAccessor<'_>,
    collection_id: i32,
    id: &ObjectUuid,
  ) -> TransportResult<Self> {
    let ev = accessor.write_change_event::<Self>(ChangeType::DeleteObject, 0, None)?;
    ev.set_collection_id(collection_id)?;
    ev.set_object_id(id)?;
    Ok(ev)
  }
}

impl CollectionUpdateEventAccessor {
  pub fn fields_changed(&self) -> AccessResult<u64> {
    self.payload.read_value(&mut MemoryOffset(20))
  }

  pub fn set_fields_changed(&self, fields_changed: u64) -> AccessResult<()> {
    self.payload.write_value(&fields_changed, &mut MemoryOffset(20))
  }

  /// Reserves an Update frame carrying only the fields named by
  /// `fields_changed`, in declared order.
  pub fn update(
    accessor: &mut TransportStreamAccessor<'_>,
    collection_id: i32,
    id: &ObjectUuid,
    fields_changed: u64,
    change_byte_count: usize,
  ) -> TransportResult<Self> {
    let ev =
      accessor.write_change_event::<Self>(ChangeType::UpdateObject, change_byte_count, None)?;
    ev.set_collection_id(collection_id)?;
    ev.set_object_id(id)?;
    ev.set_fields_changed(fields_changed)?;
    Ok(ev)
  }
}

impl CollectionMessageEventAccessor {
  pub fn message_type(&self) -> AccessResult<i32> {
    self.payload.read_value(&mut MemoryOffset(20))
  }

  pub fn set_message_type(&self, message_type: i32) -> AccessResult<()> {
    self.payload.write_value(&message_type, &mut MemoryOffset(20))
  }

  /// Window over the message bytes.
  pub fn message_data(&self) -> AccessResult<MemoryAccessor> {
    self.payload.slice_from(Self::FIXED_BYTE_COUNT)
  }

  /// Reserves a Message frame; the caller writes the payload in place
  /// through [`message_data`].
  ///
  /// [`message_data`]: Self::message_data
  pub fn message(
    accessor: &mut TransportStreamAccessor<'_>,
    collection_id: i32,
    id: &ObjectUuid,
    message_type: i32,
    message_byte_count: usize,
    timestamp: Option<u64>,
  ) -> TransportResult<Self> {
    let ev =
      accessor.write_change_event::<Self>(ChangeType::Message, message_byte_count, timestamp)?;
    ev.set_collection_id(collection_id)?;
    ev.set_object_id(id)?;
    ev.set_message_type(message_type)?;
    Ok(ev)
  }
}

impl FullUpdateRequestEventAccessor {
  pub fn collection_id_mask(&self) -> AccessResult<u64> {
    self.payload.read_value(&mut MemoryOffset(0))
  }

  pub fn set_collection_id_mask(&self, mask: u64) -> AccessResult<()> {
    self.payload.write_value(&mask, &mut MemoryOffset(0))
  }

  /// Reserves a RequestFullUpdate frame naming the collections whose
  /// mirrors need re-seeding.
  pub fn request(
    accessor: &mut TransportStreamAccessor<'_>,
    collection_id_mask: u64,
  ) -> TransportResult<Self> {
    let ev = accessor.write_change_event::<Self>(ChangeType::RequestFullUpdate, 0, None)?;
    ev.set_collection_id_mask(collection_id_mask)?;
    Ok(ev)
  }
}
