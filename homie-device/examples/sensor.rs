//! A read-only environment sensor publishing temperature and humidity every ten seconds.
//!
//! ```sh
//! cargo run --example sensor -p homie-device -- localhost
//! ```

#[path = "common/mod.rs"]
mod common;

use common::{with_last_will, RumqttcSession};
use homie_device::model::{BasicDevice, BasicNode, BasicProperty};
use homie_device::{Device, HomieDevice};
use homie_protocol::{Datatype, DeviceState};
use rand::random;
use rumqttc::MqttOptions;
use std::error::Error;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::init();

    let broker = std::env::args().nth(1).unwrap_or_else(|| "localhost".to_owned());
    let base_topic = "homie/";
    let device_id = "example_sensor";
    let will_topic = format!("{}{}/$state", base_topic, device_id);

    let mqttoptions = MqttOptions::new("homie_example_sensor", broker, 1883);
    let mqttoptions = with_last_will(mqttoptions, &will_topic, DeviceState::Lost.as_str(), 1, true);
    let session = Box::new(RumqttcSession::new(mqttoptions));

    let temperature = Arc::new(BasicProperty::new(
        "temperature",
        "Temperature",
        Datatype::Float,
        false,
        Some("\u{00b0}C"),
        None,
    ));
    let humidity = Arc::new(BasicProperty::new(
        "humidity",
        "Humidity",
        Datatype::Integer,
        false,
        Some("%"),
        None,
    ));
    let node = Arc::new(BasicNode::new(
        "sensor",
        "Sensor",
        "environment",
        vec![temperature.clone(), humidity.clone()],
    ));

    let basic_device = Arc::new(BasicDevice::new(device_id, "Homie sensor example").with_node(node));
    basic_device.set_state(DeviceState::Ready);
    let device: Arc<dyn Device> = basic_device;
    let homie = HomieDevice::new(session, vec![device], Some(base_topic))?;

    println!("Ready");
    loop {
        let reading_temperature = random::<f32>() * 40.0;
        let reading_humidity = (random::<f32>() * 100.0) as u8;
        println!("Update: {}\u{00b0}C {}%", reading_temperature, reading_humidity);

        temperature.set_stored_value(None, reading_temperature);
        homie.notify_property_changed(device_id, "sensor", "temperature");
        humidity.set_stored_value(None, reading_humidity);
        homie.notify_property_changed(device_id, "sensor", "humidity");

        thread::sleep(Duration::from_secs(10));
    }
}
