// Hand-written bindings for the test schema, in the shape the code
// generator emits: wire reader/writer accessors per type, outbound and
// reconciled object types with dirty accounting, and a data store per
// direction that registers its collections.
//
// Schema: collection 0 `Device` (ipAddress, isFlashlight, trackPose owned
// by the writer; lastAck reverse-reconciled), ping message type 5;
// collection 1 `SignalNode` (no fields, signal message type 7); collection
// 2 `Member` (serverSet reference, indexed); collection 3 `EchoNode`
// (reader-owned signal endpoint, signal message type 7).

use std::{cell::RefCell, rc::Rc, sync::Arc};

use shmflow::{
  memory::{dyn_size_of_str, MemoryAccessor, MemoryOffset},
  reconciler::{CollectionHandle, DataStoreReconciler, ObjectCollection, ReconciledObject},
  result::{AccessResult, TransportResult},
  signals::{InboundSignalForwarder, OutboundSignalData, SignalPacket, SignalPacketWriter},
  structure::{current_clock_time_microseconds, ClockSource, ObjectUuid},
  transport::{
    CollectionChangeEventAccessor, CollectionUpdateEventAccessor, TransportStream,
    TransportStreamAccessor,
  },
};

pub const DEVICE_COLLECTION: i32 = 0;
pub const SIGNAL_NODE_COLLECTION: i32 = 1;
pub const MEMBER_COLLECTION: i32 = 2;
pub const ECHO_NODE_COLLECTION: i32 = 3;

pub const PING_MESSAGE_TYPE: i32 = 5;
pub const SIGNAL_MESSAGE_TYPE: i32 = 7;

// ---------------------------------------------------------------
// Device wire accessors

pub struct DeviceReader {
  accessor: MemoryAccessor,
  offset: MemoryOffset,
}

impl DeviceReader {
  pub fn new(accessor: MemoryAccessor) -> Self {
    Self {
      accessor,
      offset: MemoryOffset::new(),
    }
  }

  pub fn read_ip_address(&mut self) -> AccessResult<String> {
    self.accessor.read_value(&mut self.offset)
  }

  pub fn read_is_flashlight(&mut self) -> AccessResult<bool> {
    self.accessor.read_value(&mut self.offset)
  }

  pub fn read_track_pose(&mut self) -> AccessResult<bool> {
    self.accessor.read_value(&mut self.offset)
  }

  pub fn read_last_ack(&mut self) -> AccessResult<i32> {
    self.accessor.read_value(&mut self.offset)
  }

  pub fn check_ip_address_changed(fields_changed: u64) -> bool {
    fields_changed & 1 != 0
  }

  pub fn check_is_flashlight_changed(fields_changed: u64) -> bool {
    fields_changed & 2 != 0
  }

  pub fn check_track_pose_changed(fields_changed: u64) -> bool {
    fields_changed & 4 != 0
  }

  pub fn check_last_ack_changed(fields_changed: u64) -> bool {
    fields_changed & 8 != 0
  }
}

pub struct DeviceWriter {
  accessor: MemoryAccessor,
  offset: MemoryOffset,
}

impl DeviceWriter {
  pub fn new(accessor: MemoryAccessor) -> Self {
    Self {
      accessor,
      offset: MemoryOffset::new(),
    }
  }

  pub fn write_ip_address(&mut self, value: &str) -> AccessResult<()> {
    self.accessor.write_value(&value.to_string(), &mut self.offset)
  }

  pub fn write_is_flashlight(&mut self, value: bool) -> AccessResult<()> {
    self.accessor.write_value(&value, &mut self.offset)
  }

  pub fn write_track_pose(&mut self, value: bool) -> AccessResult<()> {
    self.accessor.write_value(&value, &mut self.offset)
  }

  pub fn write_last_ack(&mut self, value: i32) -> AccessResult<()> {
    self.accessor.write_value(&value, &mut self.offset)
  }
}

// ---------------------------------------------------------------
// Device objects

const DEVICE_OWNED_FIELDS: u64 = 0b0111;
const DEVICE_REVERSE_FIELDS: u64 = 0b1000;

pub struct OutboundDevice {
  id: ObjectUuid,
  handle: CollectionHandle,
  create_timestamp: u64,
  change_bits: u64,
  create_written: bool,
  local_ip_address: String,
  local_is_flashlight: bool,
  local_track_pose: bool,
  local_last_ack: i32,
  fields_changed_handler: Option<Box<dyn FnMut(&mut Self, u64)>>,
  ping_handler: Option<Box<dyn FnMut(&mut Self, u64, i32)>>,
}

impl OutboundDevice {
  pub fn new() -> Rc<RefCell<Self>> {
    Rc::new(RefCell::new(Self {
      id: ObjectUuid::generate(),
      handle: CollectionHandle::unbound(),
      create_timestamp: current_clock_time_microseconds(),
      change_bits: 0,
      create_written: false,
      local_ip_address: String::new(),
      local_is_flashlight: false,
      local_track_pose: false,
      local_last_ack: 0,
      fields_changed_handler: None,
      ping_handler: None,
    }))
  }

  pub fn id(&self) -> ObjectUuid {
    self.id
  }

  pub fn ip_address(&self) -> &str {
    &self.local_ip_address
  }

  pub fn is_flashlight(&self) -> bool {
    self.local_is_flashlight
  }

  pub fn track_pose(&self) -> bool {
    self.local_track_pose
  }

  pub fn last_ack(&self) -> i32 {
    self.local_last_ack
  }

  pub fn set_ip_address(&mut self, value: &str) {
    self.local_ip_address = value.to_string();
    self.mark_dirty(1);
  }

  pub fn set_is_flashlight(&mut self, value: bool) {
    self.local_is_flashlight = value;
    self.mark_dirty(2);
  }

  pub fn set_track_pose(&mut self, value: bool) {
    self.local_track_pose = value;
    self.mark_dirty(4);
  }

  pub fn on_fields_changed(&mut self, handler: impl FnMut(&mut Self, u64) + 'static) {
    self.fields_changed_handler = Some(Box::new(handler));
  }

  pub fn on_ping(&mut self, handler: impl FnMut(&mut Self, u64, i32) + 'static) {
    self.ping_handler = Some(Box::new(handler));
  }

  pub fn send_ping(&self, value: i32) {
    if let Some(mut writer) = self.handle.send_message(self.id, PING_MESSAGE_TYPE, 4) {
      let _ = writer.accessor().write_value(&value, &mut MemoryOffset::new());
    }
  }

  fn mark_dirty(&mut self, bits: u64) {
    self.change_bits |= bits;
    self.handle.notify_object_needs_write(self.id);
    self.handle.set_dirty(self.id, bits);
  }

  fn changed_byte_count(&self, bits: u64) -> usize {
    let mut total = 0;
    if bits & 1 != 0 {
      total += dyn_size_of_str(&self.local_ip_address);
    }
    if bits & 2 != 0 {
      total += 4;
    }
    if bits & 4 != 0 {
      total += 4;
    }
    total
  }

  fn fire_fields_changed(&mut self, fields_changed: u64) {
    if let Some(mut handler) = self.fields_changed_handler.take() {
      handler(self, fields_changed);
      if self.fields_changed_handler.is_none() {
        self.fields_changed_handler = Some(handler);
      }
    }
  }
}

impl ReconciledObject for OutboundDevice {
  fn object_id(&self) -> ObjectUuid {
    self.id
  }

  fn bind_collection(&mut self, handle: CollectionHandle) {
    self.handle = handle;
  }

  fn write_changes(&mut self, accessor: &mut TransportStreamAccessor<'_>) -> TransportResult<()> {
    if !self.create_written {
      self.change_bits = DEVICE_OWNED_FIELDS;
      let byte_count = self.changed_byte_count(DEVICE_OWNED_FIELDS);
      let event = CollectionChangeEventAccessor::create(
        accessor,
        self.handle.collection_id(),
        &self.id,
        byte_count,
        self.create_timestamp,
      )?;
      let mut writer = DeviceWriter::new(event.change_data()?);
      writer.write_ip_address(&self.local_ip_address)?;
      writer.write_is_flashlight(self.local_is_flashlight)?;
      writer.write_track_pose(self.local_track_pose)?;
      self.create_written = true;
    } else {
      let bits = self.change_bits & DEVICE_OWNED_FIELDS;
      if bits != 0 {
        let event = CollectionUpdateEventAccessor::update(
          accessor,
          self.handle.collection_id(),
          &self.id,
          bits,
          self.changed_byte_count(bits),
        )?;
        let mut writer = DeviceWriter::new(event.change_data()?);
        if bits & 1 != 0 {
          writer.write_ip_address(&self.local_ip_address)?;
        }
        if bits & 2 != 0 {
          writer.write_is_flashlight(self.local_is_flashlight)?;
        }
        if bits & 4 != 0 {
          writer.write_track_pose(self.local_track_pose)?;
        }
      }
    }
    self.change_bits = 0;
    Ok(())
  }

  fn prep_full_update(&mut self) {
    self.create_written = false;
    self.change_bits = DEVICE_OWNED_FIELDS;
  }

  fn process_update(&mut self, payload: &MemoryAccessor, fields_changed: u64) -> AccessResult<()> {
    let mut reader = DeviceReader::new(payload.clone());
    if DeviceReader::check_ip_address_changed(fields_changed) {
      let _ = reader.read_ip_address()?;
    }
    if DeviceReader::check_is_flashlight_changed(fields_changed) {
      let _ = reader.read_is_flashlight()?;
    }
    if DeviceReader::check_track_pose_changed(fields_changed) {
      let _ = reader.read_track_pose()?;
    }
    if DeviceReader::check_last_ack_changed(fields_changed) {
      self.local_last_ack = reader.read_last_ack()?;
    }
    self.fire_fields_changed(fields_changed);
    Ok(())
  }

  fn process_message(
    &mut self,
    message_type: i32,
    timestamp: u64,
    payload: &MemoryAccessor,
  ) -> AccessResult<()> {
    if message_type == PING_MESSAGE_TYPE {
      let value: i32 = payload.read_value(&mut MemoryOffset::new())?;
      if let Some(mut handler) = self.ping_handler.take() {
        handler(self, timestamp, value);
        if self.ping_handler.is_none() {
          self.ping_handler = Some(handler);
        }
      }
    }
    Ok(())
  }
}

pub struct ReconciledDevice {
  id: ObjectUuid,
  handle: CollectionHandle,
  change_bits: u64,
  local_ip_address: String,
  local_is_flashlight: bool,
  local_track_pose: bool,
  local_last_ack: i32,
  fields_changed_handler: Option<Box<dyn FnMut(&mut Self, u64)>>,
  delete_handler: Option<Box<dyn FnMut(&mut Self)>>,
  ping_handler: Option<Box<dyn FnMut(&mut Self, u64, i32)>>,
}

impl ReconciledDevice {
  pub fn create(
    id: ObjectUuid,
    _payload: &MemoryAccessor,
    handle: CollectionHandle,
  ) -> Rc<RefCell<Self>> {
    Rc::new(RefCell::new(Self {
      id,
      handle,
      change_bits: 0,
      local_ip_address: String::new(),
      local_is_flashlight: false,
      local_track_pose: false,
      local_last_ack: 0,
      fields_changed_handler: None,
      delete_handler: None,
      ping_handler: None,
    }))
  }

  pub fn id(&self) -> ObjectUuid {
    self.id
  }

  pub fn ip_address(&self) -> &str {
    &self.local_ip_address
  }

  pub fn is_flashlight(&self) -> bool {
    self.local_is_flashlight
  }

  pub fn track_pose(&self) -> bool {
    self.local_track_pose
  }

  pub fn last_ack(&self) -> i32 {
    self.local_last_ack
  }

  /// Reverse-reconciled acknowledgement field, writable on this side.
  pub fn set_last_ack(&mut self, value: i32) {
    self.local_last_ack = value;
    self.change_bits |= DEVICE_REVERSE_FIELDS;
    self.handle.notify_object_needs_write(self.id);
    self.handle.set_dirty(self.id, DEVICE_REVERSE_FIELDS);
  }

  pub fn on_fields_changed(&mut self, handler: impl FnMut(&mut Self, u64) + 'static) {
    self.fields_changed_handler = Some(Box::new(handler));
  }

  pub fn on_delete(&mut self, handler: impl FnMut(&mut Self) + 'static) {
    self.delete_handler = Some(Box::new(handler));
  }

  pub fn on_ping(&mut self, handler: impl FnMut(&mut Self, u64, i32) + 'static) {
    self.ping_handler = Some(Box::new(handler));
  }

  pub fn send_ping(&self, value: i32) {
    if let Some(mut writer) = self.handle.send_message(self.id, PING_MESSAGE_TYPE, 4) {
      let _ = writer.accessor().write_value(&value, &mut MemoryOffset::new());
    }
  }

  fn fire_fields_changed(&mut self, fields_changed: u64) {
    if let Some(mut handler) = self.fields_changed_handler.take() {
      handler(self, fields_changed);
      if self.fields_changed_handler.is_none() {
        self.fields_changed_handler = Some(handler);
      }
    }
  }
}

impl ReconciledObject for ReconciledDevice {
  fn object_id(&self) -> ObjectUuid {
    self.id
  }

  fn bind_collection(&mut self, handle: CollectionHandle) {
    self.handle = handle;
  }

  fn write_changes(&mut self, accessor: &mut TransportStreamAccessor<'_>) -> TransportResult<()> {
    let bits = self.change_bits & DEVICE_REVERSE_FIELDS;
    if bits != 0 {
      let event = CollectionUpdateEventAccessor::update(
        accessor,
        self.handle.collection_id(),
        &self.id,
        bits,
        4,
      )?;
      let mut writer = DeviceWriter::new(event.change_data()?);
      writer.write_last_ack(self.local_last_ack)?;
    }
    self.change_bits = 0;
    Ok(())
  }

  fn prep_full_update(&mut self) {}

  fn process_update(&mut self, payload: &MemoryAccessor, fields_changed: u64) -> AccessResult<()> {
    let mut reader = DeviceReader::new(payload.clone());
    if DeviceReader::check_ip_address_changed(fields_changed) {
      self.local_ip_address = reader.read_ip_address()?;
    }
    if DeviceReader::check_is_flashlight_changed(fields_changed) {
      self.local_is_flashlight = reader.read_is_flashlight()?;
    }
    if DeviceReader::check_track_pose_changed(fields_changed) {
      self.local_track_pose = reader.read_track_pose()?;
    }
    if DeviceReader::check_last_ack_changed(fields_changed) {
      let _ = reader.read_last_ack()?;
    }
    self.fire_fields_changed(fields_changed);
    Ok(())
  }

  fn process_message(
    &mut self,
    message_type: i32,
    timestamp: u64,
    payload: &MemoryAccessor,
  ) -> AccessResult<()> {
    if message_type == PING_MESSAGE_TYPE {
      let value: i32 = payload.read_value(&mut MemoryOffset::new())?;
      if let Some(mut handler) = self.ping_handler.take() {
        handler(self, timestamp, value);
        if self.ping_handler.is_none() {
          self.ping_handler = Some(handler);
        }
      }
    }
    Ok(())
  }

  fn process_delete(&mut self) {
    if let Some(mut handler) = self.delete_handler.take() {
      handler(self);
    }
  }
}

// ---------------------------------------------------------------
// Signal node objects

pub struct OutboundSignalNode {
  id: ObjectUuid,
  handle: CollectionHandle,
  create_timestamp: u64,
  create_written: bool,
  signal: OutboundSignalData<f32>,
}

impl OutboundSignalNode {
  pub fn new() -> Rc<RefCell<Self>> {
    Rc::new(RefCell::new(Self {
      id: ObjectUuid::generate(),
      handle: CollectionHandle::unbound(),
      create_timestamp: current_clock_time_microseconds(),
      create_written: false,
      signal: OutboundSignalData::default(),
    }))
  }

  pub fn id(&self) -> ObjectUuid {
    self.id
  }

  pub fn signal(&mut self) -> &mut OutboundSignalData<f32> {
    &mut self.signal
  }

  /// Reserves one packet for the caller to fill with samples directly.
  pub fn send_signal(
    &mut self,
    frame_count: i32,
    num_channels: i32,
    frames_per_second: i32,
  ) -> Option<SignalPacketWriter> {
    self
      .signal
      .set_recipient(self.id, self.handle.clone(), SIGNAL_MESSAGE_TYPE);
    self
      .signal
      .send_signal_packet(frame_count, num_channels, frames_per_second)
  }

  /// Registers this node as a forwarding target for inbound packets.
  pub fn set_signal_forwarder(&self, forwarder: &InboundSignalForwarder) {
    forwarder.add_recipient(self.id, self.handle.clone(), SIGNAL_MESSAGE_TYPE);
  }
}

impl ReconciledObject for OutboundSignalNode {
  fn object_id(&self) -> ObjectUuid {
    self.id
  }

  fn bind_collection(&mut self, handle: CollectionHandle) {
    self.handle = handle;
  }

  fn write_changes(&mut self, accessor: &mut TransportStreamAccessor<'_>) -> TransportResult<()> {
    if !self.create_written {
      CollectionChangeEventAccessor::create(
        accessor,
        self.handle.collection_id(),
        &self.id,
        0,
        self.create_timestamp,
      )?;
      self.create_written = true;
    }
    Ok(())
  }

  fn prep_full_update(&mut self) {
    self.create_written = false;
  }

  fn process_update(&mut self, _payload: &MemoryAccessor, _fields_changed: u64) -> AccessResult<()> {
    Ok(())
  }

  fn process_message(
    &mut self,
    _message_type: i32,
    _timestamp: u64,
    _payload: &MemoryAccessor,
  ) -> AccessResult<()> {
    Ok(())
  }

  fn tick(&mut self) {
    self
      .signal
      .set_recipient(self.id, self.handle.clone(), SIGNAL_MESSAGE_TYPE);
    self.signal.tick();
  }
}

pub struct ReconciledSignalNode {
  id: ObjectUuid,
  handle: CollectionHandle,
  signal_handler: Option<Box<dyn FnMut(&mut Self, u64, &SignalPacket)>>,
}

impl ReconciledSignalNode {
  pub fn create(
    id: ObjectUuid,
    _payload: &MemoryAccessor,
    handle: CollectionHandle,
  ) -> Rc<RefCell<Self>> {
    Rc::new(RefCell::new(Self {
      id,
      handle,
      signal_handler: None,
    }))
  }

  pub fn id(&self) -> ObjectUuid {
    self.id
  }

  pub fn handle(&self) -> CollectionHandle {
    self.handle.clone()
  }

  pub fn on_signal(&mut self, handler: impl FnMut(&mut Self, u64, &SignalPacket) + 'static) {
    self.signal_handler = Some(Box::new(handler));
  }
}

impl ReconciledObject for ReconciledSignalNode {
  fn object_id(&self) -> ObjectUuid {
    self.id
  }

  fn bind_collection(&mut self, handle: CollectionHandle) {
    self.handle = handle;
  }

  fn write_changes(&mut self, _accessor: &mut TransportStreamAccessor<'_>) -> TransportResult<()> {
    Ok(())
  }

  fn prep_full_update(&mut self) {}

  fn process_update(&mut self, _payload: &MemoryAccessor, _fields_changed: u64) -> AccessResult<()> {
    Ok(())
  }

  fn process_message(
    &mut self,
    message_type: i32,
    timestamp: u64,
    payload: &MemoryAccessor,
  ) -> AccessResult<()> {
    if message_type == SIGNAL_MESSAGE_TYPE {
      let packet = SignalPacket::wrap(payload.clone());
      if let Some(mut handler) = self.signal_handler.take() {
        handler(self, timestamp, &packet);
        if self.signal_handler.is_none() {
          self.signal_handler = Some(handler);
        }
      }
    }
    Ok(())
  }
}

// ---------------------------------------------------------------
// Member objects (indexed reference field)

pub struct OutboundMember {
  id: ObjectUuid,
  handle: CollectionHandle,
  create_timestamp: u64,
  create_written: bool,
  change_bits: u64,
  local_server_set: ObjectUuid,
}

impl OutboundMember {
  pub fn new(server_set: ObjectUuid) -> Rc<RefCell<Self>> {
    Rc::new(RefCell::new(Self {
      id: ObjectUuid::generate(),
      handle: CollectionHandle::unbound(),
      create_timestamp: current_clock_time_microseconds(),
      create_written: false,
      change_bits: 0,
      local_server_set: server_set,
    }))
  }

  pub fn id(&self) -> ObjectUuid {
    self.id
  }

  pub fn server_set(&self) -> ObjectUuid {
    self.local_server_set
  }

  pub fn set_server_set(&mut self, value: ObjectUuid) {
    self.local_server_set = value;
    self.change_bits |= 1;
    self.handle.notify_object_needs_write(self.id);
    self.handle.set_dirty(self.id, 1);
  }
}

impl ReconciledObject for OutboundMember {
  fn object_id(&self) -> ObjectUuid {
    self.id
  }

  fn bind_collection(&mut self, handle: CollectionHandle) {
    self.handle = handle;
  }

  fn write_changes(&mut self, accessor: &mut TransportStreamAccessor<'_>) -> TransportResult<()> {
    if !self.create_written {
      let event = CollectionChangeEventAccessor::create(
        accessor,
        self.handle.collection_id(),
        &self.id,
        16,
        self.create_timestamp,
      )?;
      event
        .change_data()?
        .write_value(&self.local_server_set, &mut MemoryOffset::new())?;
      self.create_written = true;
    } else if self.change_bits & 1 != 0 {
      let event = CollectionUpdateEventAccessor::update(
        accessor,
        self.handle.collection_id(),
        &self.id,
        1,
        16,
      )?;
      event
        .change_data()?
        .write_value(&self.local_server_set, &mut MemoryOffset::new())?;
    }
    self.change_bits = 0;
    Ok(())
  }

  fn prep_full_update(&mut self) {
    self.create_written = false;
    self.change_bits = 1;
  }

  fn process_update(&mut self, _payload: &MemoryAccessor, _fields_changed: u64) -> AccessResult<()> {
    Ok(())
  }

  fn process_message(
    &mut self,
    _message_type: i32,
    _timestamp: u64,
    _payload: &MemoryAccessor,
  ) -> AccessResult<()> {
    Ok(())
  }
}

pub struct ReconciledMember {
  id: ObjectUuid,
  handle: CollectionHandle,
  local_server_set: ObjectUuid,
}

impl ReconciledMember {
  pub fn create(
    id: ObjectUuid,
    _payload: &MemoryAccessor,
    handle: CollectionHandle,
  ) -> Rc<RefCell<Self>> {
    Rc::new(RefCell::new(Self {
      id,
      handle,
      local_server_set: ObjectUuid::ZERO,
    }))
  }

  pub fn id(&self) -> ObjectUuid {
    self.id
  }

  pub fn server_set(&self) -> ObjectUuid {
    self.local_server_set
  }

  pub fn handle(&self) -> CollectionHandle {
    self.handle.clone()
  }
}

impl ReconciledObject for ReconciledMember {
  fn object_id(&self) -> ObjectUuid {
    self.id
  }

  fn bind_collection(&mut self, handle: CollectionHandle) {
    self.handle = handle;
  }

  fn write_changes(&mut self, _accessor: &mut TransportStreamAccessor<'_>) -> TransportResult<()> {
    Ok(())
  }

  fn prep_full_update(&mut self) {}

  fn process_update(&mut self, payload: &MemoryAccessor, fields_changed: u64) -> AccessResult<()> {
    if fields_changed & 1 != 0 {
      self.local_server_set = payload.read_value(&mut MemoryOffset::new())?;
    }
    Ok(())
  }

  fn process_message(
    &mut self,
    _message_type: i32,
    _timestamp: u64,
    _payload: &MemoryAccessor,
  ) -> AccessResult<()> {
    Ok(())
  }
}

// ---------------------------------------------------------------
// Data stores

/// Data store for the device-owning side: Device/SignalNode/Member are
/// outbound, EchoNode is mirrored.
pub struct DeviceWriterStore {
  pub reconciler: DataStoreReconciler,
  pub devices: Rc<ObjectCollection<OutboundDevice>>,
  pub signal_nodes: Rc<ObjectCollection<OutboundSignalNode>>,
  pub members: Rc<ObjectCollection<OutboundMember>>,
  pub echo_nodes: Rc<ObjectCollection<ReconciledSignalNode>>,
}

impl DeviceWriterStore {
  pub fn new(
    inbound: &Rc<RefCell<TransportStream>>,
    outbound: &Rc<RefCell<TransportStream>>,
  ) -> Self {
    let reconciler = DataStoreReconciler::new(inbound, outbound);
    Self::build(reconciler)
  }

  pub fn new_with_clock(
    inbound: &Rc<RefCell<TransportStream>>,
    outbound: &Rc<RefCell<TransportStream>>,
    clock: Arc<dyn ClockSource>,
  ) -> Self {
    let reconciler = DataStoreReconciler::with_clock(inbound, outbound, clock);
    Self::build(reconciler)
  }

  fn build(mut reconciler: DataStoreReconciler) -> Self {
    let devices = ObjectCollection::register(
      &mut reconciler,
      DEVICE_COLLECTION,
      DEVICE_REVERSE_FIELDS,
      0,
      true,
    );
    let signal_nodes =
      ObjectCollection::register(&mut reconciler, SIGNAL_NODE_COLLECTION, 0, 0, true);
    let members = ObjectCollection::register(&mut reconciler, MEMBER_COLLECTION, 0, 1, true);
    let echo_nodes =
      ObjectCollection::register(&mut reconciler, ECHO_NODE_COLLECTION, 0, 0, false);
    echo_nodes.set_create_delegate(Box::new(ReconciledSignalNode::create));
    Self {
      reconciler,
      devices,
      signal_nodes,
      members,
      echo_nodes,
    }
  }

  pub fn create_device(&self) -> Rc<RefCell<OutboundDevice>> {
    let device = OutboundDevice::new();
    self.devices.add_object(&device);
    device
  }

  pub fn create_signal_node(&self) -> Rc<RefCell<OutboundSignalNode>> {
    let node = OutboundSignalNode::new();
    self.signal_nodes.add_object(&node);
    node
  }

  pub fn create_member(&self, server_set: ObjectUuid) -> Rc<RefCell<OutboundMember>> {
    let member = OutboundMember::new(server_set);
    self.members.add_object(&member);
    member
  }
}

/// Data store for the mirroring side: Device/SignalNode/Member are
/// mirrored, EchoNode is outbound.
pub struct DeviceReaderStore {
  pub reconciler: DataStoreReconciler,
  pub devices: Rc<ObjectCollection<ReconciledDevice>>,
  pub signal_nodes: Rc<ObjectCollection<ReconciledSignalNode>>,
  pub members: Rc<ObjectCollection<ReconciledMember>>,
  pub echo_nodes: Rc<ObjectCollection<OutboundSignalNode>>,
}

impl DeviceReaderStore {
  pub fn new(
    inbound: &Rc<RefCell<TransportStream>>,
    outbound: &Rc<RefCell<TransportStream>>,
  ) -> Self {
    let reconciler = DataStoreReconciler::new(inbound, outbound);
    Self::build(reconciler)
  }

  pub fn new_with_clock(
    inbound: &Rc<RefCell<TransportStream>>,
    outbound: &Rc<RefCell<TransportStream>>,
    clock: Arc<dyn ClockSource>,
  ) -> Self {
    let reconciler = DataStoreReconciler::with_clock(inbound, outbound, clock);
    Self::build(reconciler)
  }

  fn build(mut reconciler: DataStoreReconciler) -> Self {
    let devices = ObjectCollection::register(
      &mut reconciler,
      DEVICE_COLLECTION,
      DEVICE_OWNED_FIELDS,
      0,
      false,
    );
    devices.set_create_delegate(Box::new(ReconciledDevice::create));
    let signal_nodes =
      ObjectCollection::register(&mut reconciler, SIGNAL_NODE_COLLECTION, 0, 0, false);
    signal_nodes.set_create_delegate(Box::new(ReconciledSignalNode::create));
    let members = ObjectCollection::register(&mut reconciler, MEMBER_COLLECTION, 1, 1, false);
    members.set_create_delegate(Box::new(ReconciledMember::create));
    let echo_nodes = ObjectCollection::register(&mut reconciler, ECHO_NODE_COLLECTION, 0, 0, true);
    Self {
      reconciler,
      devices,
      signal_nodes,
      members,
      echo_nodes,
    }
  }

  pub fn create_echo_node(&self) -> Rc<RefCell<OutboundSignalNode>> {
    let node = OutboundSignalNode::new();
    self.echo_nodes.add_object(&node);
    node
  }
}
