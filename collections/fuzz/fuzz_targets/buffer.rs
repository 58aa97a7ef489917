#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tidepool_collections::{Error, GrowableBuffer};

const MAX_LEN: usize = 10_000;

#[derive(Arbitrary, Debug)]
enum BufferOperation {
    Push(u32),
    Insert(usize, u32),
    Remove(usize),
    Pop,
    Truncate(usize),
    Clear,
    EnsureCapacity(u16),
    ExtendFromSlice(Vec<u32>),
    Resize(u16, u32),
    Set(usize, u32),
    Clone,
}

fn fuzz(ops: Vec<BufferOperation>) {
    let mut buffer = GrowableBuffer::<String>::new();
    let mut model: Vec<String> = Vec::new();

    for op in ops {
        let capacity = buffer.capacity();
        match op {
            BufferOperation::Push(value) => {
                if model.len() < MAX_LEN {
                    buffer.push(value.to_string()).unwrap();
                    model.push(value.to_string());
                }
            }

            BufferOperation::Insert(index, value) => {
                if model.len() >= MAX_LEN {
                    continue;
                }
                if index <= model.len() {
                    buffer.insert(index, value.to_string()).unwrap();
                    model.insert(index, value.to_string());
                } else {
                    assert!(matches!(
                        buffer.insert(index, value.to_string()),
                        Err(Error::OutOfRange { .. })
                    ));
                }
            }

            BufferOperation::Remove(index) => {
                if index < model.len() {
                    assert_eq!(buffer.remove(index).unwrap(), model.remove(index));
                } else {
                    assert!(buffer.remove(index).is_err());
                }
            }

            BufferOperation::Pop => {
                assert_eq!(buffer.pop().unwrap(), model.pop());
            }

            BufferOperation::Truncate(len) => {
                buffer.truncate(len).unwrap();
                model.truncate(len);
            }

            BufferOperation::Clear => {
                buffer.clear().unwrap();
                model.clear();
                assert_eq!(buffer.capacity(), capacity);
            }

            BufferOperation::EnsureCapacity(min) => {
                let min = min as usize;
                let result = buffer.ensure_capacity(min).unwrap();
                assert!(result >= min);
                assert_eq!(result, buffer.capacity());
            }

            BufferOperation::ExtendFromSlice(values) => {
                let take = values.len().min(MAX_LEN - model.len());
                let values: Vec<String> = values[..take].iter().map(|v| v.to_string()).collect();
                buffer.extend_from_slice(&values).unwrap();
                model.extend(values);
            }

            BufferOperation::Resize(len, value) => {
                let len = (len as usize).min(MAX_LEN);
                buffer.resize(len, value.to_string()).unwrap();
                model.resize(len, value.to_string());
            }

            BufferOperation::Set(index, value) => {
                if index < model.len() {
                    *buffer.get_mut(index).unwrap() = value.to_string();
                    model[index] = value.to_string();
                } else {
                    assert!(buffer.get_mut(index).is_err());
                }
            }

            BufferOperation::Clone => {
                let copy = buffer.try_clone().unwrap();
                assert_eq!(copy.as_slice().unwrap(), model.as_slice());
            }
        }

        assert_eq!(buffer.as_slice().unwrap(), model.as_slice());
        assert!(buffer.capacity() >= buffer.len());
        assert!(buffer.capacity() >= capacity);
    }

    buffer.dispose();
    assert!(buffer.is_disposed());
    assert!(buffer.as_slice().is_err());
}

fuzz_target!(|ops: Vec<BufferOperation>| {
    fuzz(ops);
});
