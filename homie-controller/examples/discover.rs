//! Discovers every Homie device under `homie/` and logs whenever a property value changes.
//!
//! ```sh
//! cargo run --example discover -p homie-controller -- localhost
//! ```

#[path = "common/mod.rs"]
mod common;

use common::RumqttcSession;
use homie_controller::{ControllerEventHandler, Device, HomieController};
use rumqttc::MqttOptions;
use std::error::Error;
use std::thread;
use std::time::Duration;

struct PrintingHandler;

impl ControllerEventHandler for PrintingHandler {
    fn on_broadcast(&self, level: &str, payload: &str) {
        println!("broadcast[{}] {}", level, payload);
    }

    fn on_device_discovered(&self, device: &Device) {
        println!("discovered {} ({})", device.id, device.name.as_deref().unwrap_or("?"));
    }

    fn on_device_changed(&self, device: &Device) {
        println!("{} changed: state={:?}", device.id, device.state);
    }

    fn on_property_value_changed(
        &self,
        device: &Device,
        node_id: &str,
        index: Option<u32>,
        property_id: &str,
        value: &str,
    ) {
        match index {
            Some(i) => println!("{}/{}_{}/{} = {}", device.id, node_id, i, property_id, value),
            None => println!("{}/{}/{} = {}", device.id, node_id, property_id, value),
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::init();

    let broker = std::env::args().nth(1).unwrap_or_else(|| "localhost".to_owned());
    let mqttoptions = MqttOptions::new("homie_controller_discover", broker, 1883);
    let session = Box::new(RumqttcSession::new(mqttoptions));

    let controller = HomieController::new(session, None)?;
    controller.set_event_handler(Some(std::sync::Arc::new(PrintingHandler)));

    loop {
        thread::sleep(Duration::from_secs(60));
        if !controller.is_connected() {
            println!("disconnected from broker");
        }
    }
}
