//! End-to-end driver tests against an in-process Modbus TCP responder.
//!
//! The responder implements just enough of the MBAP framing to answer the
//! four read function codes with canned values, so the driver under test
//! exercises its real transport path without external hardware.

use modbus_feed::config::{FunctionCode, Mode};
use modbus_feed::driver::{ConnectionState, DriverEvent, ModbusDriver};
use modbus_feed::store::ConfigStore;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

/// Canned data served by the responder.
#[derive(Clone)]
enum Canned {
    Words(Vec<u16>),
    Bits(Vec<bool>),
}

/// Serves Modbus TCP read requests with the canned values, one connection at
/// a time, until the listener is dropped.
async fn serve(listener: TcpListener, canned: Canned) {
    loop {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let canned = canned.clone();
        tokio::spawn(async move {
            let mut header = [0u8; 7];
            loop {
                if socket.read_exact(&mut header).await.is_err() {
                    return;
                }
                let remaining = u16::from_be_bytes([header[4], header[5]]) as usize;
                // Unit id is part of the header; the PDU follows.
                let mut pdu = vec![0u8; remaining - 1];
                if socket.read_exact(&mut pdu).await.is_err() {
                    return;
                }

                let count = u16::from_be_bytes([pdu[3], pdu[4]]) as usize;
                let payload = match &canned {
                    Canned::Words(words) => {
                        let mut data = Vec::with_capacity(words.len() * 2);
                        for word in words.iter().take(count) {
                            data.extend_from_slice(&word.to_be_bytes());
                        }
                        data
                    }
                    Canned::Bits(bits) => {
                        let mut data = vec![0u8; count.div_ceil(8)];
                        for (i, bit) in bits.iter().take(count).enumerate() {
                            if *bit {
                                data[i / 8] |= 1 << (i % 8);
                            }
                        }
                        data
                    }
                };

                let mut response = Vec::with_capacity(9 + payload.len());
                response.extend_from_slice(&header[0..4]); // transaction + protocol id
                response.extend_from_slice(&((3 + payload.len()) as u16).to_be_bytes());
                response.push(header[6]); // unit id
                response.push(pdu[0]); // function code
                response.push(payload.len() as u8);
                response.extend_from_slice(&payload);
                if socket.write_all(&response).await.is_err() {
                    return;
                }
            }
        });
    }
}

/// Binds a responder on an ephemeral port and returns its port number.
async fn spawn_responder(canned: Canned) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(serve(listener, canned));
    port
}

fn tcp_driver(port: u16) -> (ModbusDriver, UnboundedReceiver<DriverEvent>) {
    let (driver, events) = ModbusDriver::new(ConfigStore::ephemeral());
    driver.set_mode(Mode::Tcp);
    driver.set_tcp_host("127.0.0.1");
    driver.set_tcp_port(port);
    (driver, events)
}

async fn next_frame(events: &mut UnboundedReceiver<DriverEvent>) -> Vec<u8> {
    loop {
        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("event channel closed");
        if let DriverEvent::DataReceived(frame) = event {
            return frame;
        }
    }
}

#[tokio::test]
async fn holding_registers_become_csv_frames() {
    let port = spawn_responder(Canned::Words(vec![1, 2, 3])).await;
    let (mut driver, mut events) = tcp_driver(port);
    driver.set_function_code(FunctionCode::ReadHoldingRegisters);
    driver.set_start_address(0);
    driver.set_register_count(3);
    driver.set_poll_interval(Duration::from_millis(100));

    driver.open().await.unwrap();
    assert!(driver.is_open());

    // State transitions were reported in order.
    assert_eq!(
        events.recv().await.unwrap(),
        DriverEvent::StateChanged(ConnectionState::Connecting)
    );
    assert_eq!(
        events.recv().await.unwrap(),
        DriverEvent::StateChanged(ConnectionState::Connected)
    );

    assert_eq!(next_frame(&mut events).await, b"1,2,3\n");
    // Frames keep coming on subsequent ticks.
    assert_eq!(next_frame(&mut events).await, b"1,2,3\n");

    driver.close();
}

#[tokio::test]
async fn coils_render_as_bits() {
    let port = spawn_responder(Canned::Bits(vec![true, false, true])).await;
    let (mut driver, mut events) = tcp_driver(port);
    driver.set_function_code(FunctionCode::ReadCoils);
    driver.set_register_count(3);
    driver.set_poll_interval(Duration::from_millis(100));

    driver.open().await.unwrap();
    assert_eq!(next_frame(&mut events).await, b"1,0,1\n");
    driver.close();
}

#[tokio::test]
async fn close_stops_polling() {
    let port = spawn_responder(Canned::Words(vec![42])).await;
    let (mut driver, mut events) = tcp_driver(port);
    driver.set_register_count(1);
    driver.set_poll_interval(Duration::from_millis(100));

    driver.open().await.unwrap();
    let _ = next_frame(&mut events).await;
    driver.close();
    assert!(!driver.is_open());

    // Drain whatever was queued before the close, then expect silence.
    while let Ok(event) = events.try_recv() {
        drop(event);
    }
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn interval_change_restarts_the_timer() {
    let port = spawn_responder(Canned::Words(vec![7])).await;
    let (mut driver, mut events) = tcp_driver(port);
    driver.set_register_count(1);
    driver.set_poll_interval(Duration::from_millis(500));

    driver.open().await.unwrap();
    assert_eq!(next_frame(&mut events).await, b"7\n");

    // Stretch the period: the pending 500 ms tick is dropped and the next
    // poll happens one new period from now.
    assert!(driver.set_poll_interval(Duration::from_secs(3)));
    let quiet = timeout(Duration::from_millis(1500), next_frame(&mut events)).await;
    assert!(quiet.is_err(), "tick fired before the new period elapsed");

    driver.close();
}

#[tokio::test]
async fn reopen_after_close_works() {
    let port = spawn_responder(Canned::Words(vec![5, 6])).await;
    let (mut driver, mut events) = tcp_driver(port);
    driver.set_register_count(2);
    driver.set_poll_interval(Duration::from_millis(100));

    driver.open().await.unwrap();
    assert_eq!(next_frame(&mut events).await, b"5,6\n");
    driver.close();

    driver.open().await.unwrap();
    assert_eq!(next_frame(&mut events).await, b"5,6\n");
    driver.close();
}
