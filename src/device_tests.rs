//! Tests for the `device` module.

use super::*;
use tempfile::tempdir;

#[test]
fn write_then_read_round_trips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.bin");
    let mut dev = BlockDevice::open(&path).unwrap();

    dev.write_at(0, b"hello, device").unwrap();
    let back = dev.read_at(0, 14).unwrap();
    assert_eq!(&back, b"hello, device");
}

#[test]
fn write_past_current_capacity_grows_the_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.bin");
    let mut dev = BlockDevice::open(&path).unwrap();

    dev.write_at(10_000, b"tail").unwrap();
    assert!(dev.capacity() >= 10_004);
    assert_eq!(&dev.read_at(10_000, 4).unwrap(), b"tail");
}

#[test]
fn read_past_end_of_file_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.bin");
    let mut dev = BlockDevice::open(&path).unwrap();
    dev.write_at(0, b"short").unwrap();

    assert!(dev.read_at(0, 4096).is_err());
}

#[cfg(unix)]
#[test]
fn second_open_of_the_same_path_is_device_busy() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.bin");
    let _first = BlockDevice::open(&path).unwrap();

    let second = BlockDevice::open(&path);
    assert!(matches!(second, Err(Error::DeviceBusy(_))));
}

#[cfg(unix)]
#[test]
fn dropping_a_handle_releases_its_lock() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.bin");
    {
        let _first = BlockDevice::open(&path).unwrap();
    }
    let second = BlockDevice::open(&path);
    assert!(second.is_ok());
}
