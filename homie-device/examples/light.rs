//! A settable light with a power switch and an RGB colour, demonstrating `with_setter` and
//! `notify_property_changed`.
//!
//! ```sh
//! cargo run --example light -p homie-device -- localhost
//! ```

#[path = "common/mod.rs"]
mod common;

use common::{with_last_will, RumqttcSession};
use homie_device::model::{BasicDevice, BasicNode, BasicProperty};
use homie_device::{Device, HomieDevice};
use homie_protocol::{Datatype, DeviceState};
use rumqttc::MqttOptions;
use std::error::Error;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::init();

    let broker = std::env::args().nth(1).unwrap_or_else(|| "localhost".to_owned());
    let base_topic = "homie/";
    let device_id = "example_light";
    let will_topic = format!("{}{}/$state", base_topic, device_id);

    let mqttoptions = MqttOptions::new("homie_example_light", broker, 1883);
    let mqttoptions = with_last_will(mqttoptions, &will_topic, DeviceState::Lost.as_str(), 1, true);
    let session = Box::new(RumqttcSession::new(mqttoptions));

    let power = Arc::new(
        BasicProperty::new("power", "On", Datatype::Boolean, true, None, None)
            .with_value(false)
            .with_setter(|_, value| println!("power set to {}", value)),
    );
    let colour = Arc::new(
        BasicProperty::new("colour", "Colour", Datatype::Color, true, None, Some("rgb"))
            .with_value("255,255,255")
            .with_setter(|_, value| println!("colour set to {}", value)),
    );
    let node = Arc::new(BasicNode::new("light", "Light", "light", vec![power, colour]));

    let basic_device = Arc::new(BasicDevice::new(device_id, "Homie light example").with_node(node));
    basic_device.set_state(DeviceState::Ready);
    let device: Arc<dyn Device> = basic_device;
    let homie = HomieDevice::new(session, vec![device], Some(base_topic))?;

    println!("Ready");
    loop {
        thread::sleep(Duration::from_secs(60));
        if !homie.is_connected() {
            println!("disconnected from broker");
        }
    }
}
