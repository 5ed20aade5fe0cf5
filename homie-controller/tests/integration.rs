//! Round-trip test wiring a `homie-device` device directly to a `homie-controller` controller
//! over an in-memory bus, with no broker in between: this exercises the isomorphism the engine
//! promises — any tree a device publishes reconstructs into an equivalent tree on the controller
//! side.

use homie_controller::{ControllerEventHandler, Device as DiscoveredDevice, HomieController};
use homie_device::model::{BasicDevice, BasicNode, BasicProperty};
use homie_device::{Device as DeviceModel, HomieDevice};
use homie_protocol::{Datatype, DeviceState, MqttEventHandler, MqttSession, Qos, SessionError};
use std::sync::{Arc, Mutex};

enum Role {
    Device,
    Controller,
}

/// Connects exactly one device-role session to one controller-role session with no broker
/// between them: a publish from one side is delivered synchronously to the other's installed
/// handler, which is all two directly wired clients behind a real broker would observe anyway.
struct Bus {
    device_handler: Mutex<Option<Arc<dyn MqttEventHandler>>>,
    controller_handler: Mutex<Option<Arc<dyn MqttEventHandler>>>,
}

impl Bus {
    fn new() -> Arc<Self> {
        Arc::new(Bus {
            device_handler: Mutex::new(None),
            controller_handler: Mutex::new(None),
        })
    }
}

struct BusSession {
    bus: Arc<Bus>,
    role: Role,
    connected: bool,
}

impl BusSession {
    fn new(bus: Arc<Bus>, role: Role) -> Box<dyn MqttSession> {
        Box::new(BusSession {
            bus,
            role,
            connected: false,
        })
    }

    fn own_slot(&self) -> &Mutex<Option<Arc<dyn MqttEventHandler>>> {
        match self.role {
            Role::Device => &self.bus.device_handler,
            Role::Controller => &self.bus.controller_handler,
        }
    }

    fn peer_slot(&self) -> &Mutex<Option<Arc<dyn MqttEventHandler>>> {
        match self.role {
            Role::Device => &self.bus.controller_handler,
            Role::Controller => &self.bus.device_handler,
        }
    }
}

impl MqttSession for BusSession {
    fn set_event_handler(&mut self, handler: Option<Arc<dyn MqttEventHandler>>) {
        *self.own_slot().lock().unwrap() = handler;
    }

    fn open_with_will(
        &mut self,
        _will_topic: &str,
        _will_payload: &str,
        _will_qos: Qos,
        _will_retain: bool,
    ) -> Result<(), SessionError> {
        // Real transports connect asynchronously and deliver `on_connect` later, from a separate
        // poll; the test fires it explicitly afterwards for the same reason (see the module doc
        // on `MqttSession` about reentrancy).
        self.connected = true;
        Ok(())
    }

    fn open(&mut self) -> Result<(), SessionError> {
        self.connected = true;
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &str, _qos: Qos, _retain: bool) -> Result<(), SessionError> {
        if let Some(handler) = self.peer_slot().lock().unwrap().clone() {
            handler.on_message(topic, payload);
        }
        Ok(())
    }

    fn subscribe(&mut self, _topic: &str, _qos: Qos) -> Result<(), SessionError> {
        Ok(())
    }

    fn unsubscribe(&mut self, _topic: &str) -> Result<(), SessionError> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

struct RecordingHandler {
    discovered: Mutex<Vec<DiscoveredDevice>>,
    value_changes: Mutex<Vec<(String, String, String, String)>>,
}

impl RecordingHandler {
    fn new() -> Arc<Self> {
        Arc::new(RecordingHandler {
            discovered: Mutex::new(Vec::new()),
            value_changes: Mutex::new(Vec::new()),
        })
    }
}

impl ControllerEventHandler for RecordingHandler {
    fn on_device_discovered(&self, device: &DiscoveredDevice) {
        self.discovered.lock().unwrap().push(device.clone());
    }

    fn on_property_value_changed(
        &self,
        device: &DiscoveredDevice,
        node_id: &str,
        _index: Option<u32>,
        property_id: &str,
        value: &str,
    ) {
        self.value_changes.lock().unwrap().push((
            device.id.clone(),
            node_id.to_owned(),
            property_id.to_owned(),
            value.to_owned(),
        ));
    }
}

fn property() -> Arc<BasicProperty> {
    Arc::new(
        BasicProperty::new(
            "intensity",
            "Intensity",
            Datatype::Integer,
            true,
            Some("%"),
            Some("0:100"),
        )
        .with_value(100),
    )
}

/// Fires `on_connect` on whichever handler a role has installed into the bus. Mirrors what a real
/// transport does once its connection actually comes up, asynchronously and after `open` /
/// `open_with_will` has already returned (see the reentrancy note on `MqttSession`).
fn fire_on_connect(bus: &Bus, role: Role) {
    let slot = match role {
        Role::Device => &bus.device_handler,
        Role::Controller => &bus.controller_handler,
    };
    let handler = slot.lock().unwrap().clone();
    handler.unwrap().on_connect(false, false);
}

#[test]
fn device_tree_round_trips_through_controller() {
    let bus = Bus::new();

    // The controller must be wired up first, so its handler is already installed by the time the
    // device republishes its whole tree.
    let handler = RecordingHandler::new();
    let controller = HomieController::new(BusSession::new(bus.clone(), Role::Controller), None).unwrap();
    controller.set_event_handler(Some(handler.clone()));

    let node = Arc::new(BasicNode::new("testnode", "Testnode", "light", vec![property()]));
    let basic_device = Arc::new(BasicDevice::new("testdevice", "Testdevice").with_node(node));
    basic_device.set_state(DeviceState::Ready);
    let device: Arc<dyn DeviceModel> = basic_device.clone();
    let homie_device = HomieDevice::new(BusSession::new(bus.clone(), Role::Device), vec![device], None).unwrap();
    fire_on_connect(&bus, Role::Device);

    // Discovery should have happened synchronously, as soon as `$state=ready` was published.
    let discovered = handler.discovered.lock().unwrap().clone();
    assert_eq!(discovered.len(), 1);
    let discovered_device = controller.get_discovered_device("testdevice").unwrap();
    assert_eq!(discovered_device.name.as_deref(), Some("Testdevice"));
    assert_eq!(discovered_device.homie_version.as_deref(), Some("3.0.0"));
    assert_eq!(discovered_device.state, DeviceState::Ready);

    let node = &discovered_device.nodes["testnode"];
    assert_eq!(node.name.as_deref(), Some("Testnode"));
    assert_eq!(node.node_type.as_deref(), Some("light"));
    assert!(!node.is_arrayed());

    let property = &node.properties["intensity"];
    assert_eq!(property.name.as_deref(), Some("Intensity"));
    assert_eq!(property.datatype, Some(Datatype::Integer));
    assert!(property.settable);
    assert_eq!(property.unit.as_deref(), Some("%"));
    assert_eq!(property.format.as_deref(), Some("0:100"));
    assert_eq!(property.value::<i64>(None), Ok(100));

    // A live update after discovery should surface as a fine-grained change, not silently.
    basic_device.nodes()[0]
        .properties()
        .iter()
        .find(|p| p.id() == "intensity")
        .unwrap()
        .set_value(None, "55");
    homie_device.notify_property_changed("testdevice", "testnode", "intensity");

    let changes = handler.value_changes.lock().unwrap().clone();
    assert_eq!(
        changes,
        vec![(
            "testdevice".to_owned(),
            "testnode".to_owned(),
            "intensity".to_owned(),
            "55".to_owned()
        )]
    );
    let updated = controller.get_discovered_device("testdevice").unwrap();
    assert_eq!(
        updated.nodes["testnode"].properties["intensity"].value::<i64>(None),
        Ok(55)
    );
}

#[test]
fn arrayed_device_round_trips_through_controller() {
    let bus = Bus::new();

    let controller = HomieController::new(BusSession::new(bus.clone(), Role::Controller), None).unwrap();

    let property = Arc::new(
        BasicProperty::new("intensity", "Intensity", Datatype::Integer, false, None, None)
            .with_value_at(1, 99)
            .with_value_at(2, 98)
            .with_value_at(3, 97),
    );
    let node = Arc::new(BasicNode::new("testnode", "Testnode", "light", vec![property]).arrayed(1, 3));
    let basic_device = Arc::new(BasicDevice::new("testdevice", "Testdevice").with_node(node));
    basic_device.set_state(DeviceState::Ready);
    let device: Arc<dyn DeviceModel> = basic_device.clone();
    let _homie_device = HomieDevice::new(BusSession::new(bus.clone(), Role::Device), vec![device], None).unwrap();
    fire_on_connect(&bus, Role::Device);

    let discovered_device = controller.get_discovered_device("testdevice").unwrap();
    let node = &discovered_device.nodes["testnode"];
    assert!(node.is_arrayed());
    assert_eq!(node.array, Some((1, 3)));

    let property = &node.properties["intensity"];
    assert_eq!(property.value::<i64>(Some(1)), Ok(99));
    assert_eq!(property.value::<i64>(Some(2)), Ok(98));
    assert_eq!(property.value::<i64>(Some(3)), Ok(97));
}
