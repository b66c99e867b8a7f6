// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use cryptoport::channel::{Channel, Loopback, Options, Virtqueue};
use cryptoport::guest::{Device, Registry};
use cryptoport::host::soft::Soft;
use cryptoport::host::Dispatcher;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    Loopback,
    Virtqueue,
}

/// A guest registry wired to one software host.
pub struct Fixture {
    pub transport: Transport,
    pub registry: Registry,
    pub dispatcher: Arc<Dispatcher<Soft>>,

    /// A raw channel to the same host, bypassing the guest devices.
    pub channel: Box<dyn Channel>,
}

fn channel(transport: Transport, dispatcher: &Arc<Dispatcher<Soft>>) -> Box<dyn Channel> {
    match transport {
        Transport::Loopback => Box::new(Loopback::new(dispatcher.clone())),
        Transport::Virtqueue => {
            Box::new(Virtqueue::spawn(dispatcher.clone(), Options::default()).unwrap())
        }
    }
}

/// Runs `test` once per transport, with devices `0..devices` registered.
pub fn run_test(devices: u32, mut test: impl FnMut(&Fixture)) {
    for transport in [Transport::Loopback, Transport::Virtqueue] {
        let dispatcher = Arc::new(Dispatcher::new(Soft::default()));
        let registry = Registry::new();
        for minor in 0..devices {
            let channel = channel(transport, &dispatcher);
            registry.add(Device::new(minor, channel)).unwrap();
        }

        let fixture = Fixture {
            transport,
            registry,
            channel: channel(transport, &dispatcher),
            dispatcher,
        };
        test(&fixture);
        fixture.dispatcher.shutdown();
    }
}
