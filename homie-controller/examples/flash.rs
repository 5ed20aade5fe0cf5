//! Turns every discovered boolean settable property on and off, four times, five seconds apart.
//!
//! ```sh
//! cargo run --example flash -p homie-controller -- localhost
//! ```

#[path = "common/mod.rs"]
mod common;

use common::RumqttcSession;
use homie_controller::{Datatype, HomieController};
use rumqttc::MqttOptions;
use std::error::Error;
use std::thread;
use std::time::Duration;

fn main() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::init();

    let broker = std::env::args().nth(1).unwrap_or_else(|| "localhost".to_owned());
    let mqttoptions = MqttOptions::new("homie_controller_flash", broker, 1883);
    let session = Box::new(RumqttcSession::new(mqttoptions));

    let controller = HomieController::new(session, None)?;

    // Give the broker time to redeliver retained state before we start flipping switches.
    thread::sleep(Duration::from_secs(5));

    for _ in 0..4 {
        for value in [true, false] {
            println!("turning everything {}", if value { "on" } else { "off" });
            for device in controller.get_discovered_devices() {
                for node in device.nodes.values() {
                    for property in node.properties.values() {
                        if property.settable && property.datatype == Some(Datatype::Boolean) {
                            println!("{}/{}/{} set to {}", device.id, node.id, property.id, value);
                            controller.set(&device.id, &node.id, &property.id, None, &value.to_string());
                        }
                    }
                }
            }
            thread::sleep(Duration::from_secs(5));
        }
    }

    controller.shutdown();
    Ok(())
}
