//! Walks a device through its full lifecycle: `ready`, `sleeping`, `ready` again, `alert`,
//! `ready`, then an orderly `disconnected` shutdown. Run against a local broker:
//!
//! ```sh
//! cargo run --example lifecycle -p homie-device -- localhost
//! ```

#[path = "common/mod.rs"]
mod common;

use common::{with_last_will, RumqttcSession};
use homie_device::model::BasicDevice;
use homie_device::{Device, HomieDevice};
use homie_protocol::DeviceState;
use rumqttc::MqttOptions;
use std::error::Error;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::init();

    let broker = std::env::args().nth(1).unwrap_or_else(|| "localhost".to_owned());
    let base_topic = "homie/";
    let device_id = "example_lifecycle";
    let will_topic = format!("{}{}/$state", base_topic, device_id);

    let mqttoptions = MqttOptions::new("homie_example_lifecycle", broker, 1883);
    let mqttoptions = with_last_will(mqttoptions, &will_topic, DeviceState::Lost.as_str(), 1, true);
    let session = Box::new(RumqttcSession::new(mqttoptions));

    let basic_device = Arc::new(BasicDevice::new(device_id, "Homie lifecycle example"));
    basic_device.set_state(DeviceState::Ready);
    let device: Arc<dyn Device> = basic_device.clone();
    let homie = HomieDevice::new(session, vec![device], Some(base_topic))?;

    println!("init");
    thread::sleep(Duration::from_secs(5));

    for (state, label) in [
        (DeviceState::Ready, "ready"),
        (DeviceState::Sleeping, "sleeping"),
        (DeviceState::Ready, "ready"),
        (DeviceState::Alert, "alert"),
        (DeviceState::Ready, "ready"),
    ] {
        basic_device.set_state(state);
        homie.notify_state_changed(device_id);
        println!("{}", label);
        thread::sleep(Duration::from_secs(5));
    }

    homie.shutdown();
    println!("disconnected");
    Ok(())
}
