#![no_main]

use arbitrary::Arbitrary;
use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use tidepool_collections::{BitVector, Error};

const MAX_LEN: usize = 10_000;

#[derive(Arbitrary, Debug)]
enum BitVectorOperation {
    Push(bool),
    Pop,
    Set(usize, bool),
    Toggle(usize),
    SetAll(bool),
    Append(u16, bool),
    TruncateFromEnd(u16),
    RemoveRange(usize, usize),
    Resize(u16, bool),
    And(Vec<bool>),
    Or(Vec<bool>),
    Xor(Vec<bool>),
    Not,
    IndexOf(bool, usize, usize),
    LastIndexOf(bool, usize, usize),
    Encode,
    ToBytes,
}

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    initial: Vec<bool>,
    ops: Vec<BitVectorOperation>,
}

fn fuzz(input: FuzzInput) {
    let mut model: Vec<bool> = input.initial.into_iter().take(MAX_LEN).collect();
    let mut bv = BitVector::from_bools(&model).unwrap();

    for op in input.ops {
        match op {
            BitVectorOperation::Push(value) => {
                if model.len() < MAX_LEN {
                    bv.push(value).unwrap();
                    model.push(value);
                }
            }

            BitVectorOperation::Pop => {
                assert_eq!(bv.pop().unwrap(), model.pop());
            }

            BitVectorOperation::Set(index, value) => {
                if index < model.len() {
                    bv.set(index, value).unwrap();
                    model[index] = value;
                } else {
                    assert!(matches!(
                        bv.set(index, value),
                        Err(Error::OutOfRange { .. })
                    ));
                }
            }

            BitVectorOperation::Toggle(index) => {
                if index < model.len() {
                    bv.toggle(index).unwrap();
                    model[index] = !model[index];
                } else {
                    assert!(bv.toggle(index).is_err());
                }
            }

            BitVectorOperation::SetAll(value) => {
                bv.set_all(value).unwrap();
                model.iter_mut().for_each(|bit| *bit = value);
            }

            BitVectorOperation::Append(count, value) => {
                let count = (count as usize).min(MAX_LEN - model.len());
                bv.append(count, value).unwrap();
                model.extend(std::iter::repeat(value).take(count));
            }

            BitVectorOperation::TruncateFromEnd(count) => {
                let count = count as usize;
                if count <= model.len() {
                    bv.truncate_from_end(count).unwrap();
                    model.truncate(model.len() - count);
                } else {
                    assert!(bv.truncate_from_end(count).is_err());
                }
            }

            BitVectorOperation::RemoveRange(start, count) => {
                let version = bv.version();
                match bv.remove_range(start, count) {
                    Ok(()) => {
                        if count > 0 {
                            assert_eq!(start + count, model.len());
                            model.truncate(start);
                        }
                    }
                    Err(Error::NotSupported(_)) => {
                        assert!(count > 0 && start + count < model.len());
                    }
                    Err(Error::OutOfRange { .. }) => {
                        assert!(start.saturating_add(count) > model.len());
                    }
                    Err(err) => panic!("unexpected error: {err}"),
                }
                if count == 0 {
                    assert_eq!(bv.version(), version);
                }
            }

            BitVectorOperation::Resize(len, value) => {
                let len = (len as usize).min(MAX_LEN);
                bv.resize(len, value).unwrap();
                model.resize(len, value);
            }

            BitVectorOperation::And(other) => {
                binary_op(&mut bv, &mut model, other, BitVector::and, |a, b| a & b)
            }

            BitVectorOperation::Or(other) => {
                binary_op(&mut bv, &mut model, other, BitVector::or, |a, b| a | b)
            }

            BitVectorOperation::Xor(other) => {
                binary_op(&mut bv, &mut model, other, BitVector::xor, |a, b| a ^ b)
            }

            BitVectorOperation::Not => {
                bv.not().unwrap();
                model.iter_mut().for_each(|bit| *bit = !*bit);
            }

            BitVectorOperation::IndexOf(value, start, count) => {
                let result = bv.index_of(value, start, count);
                if start <= model.len() && count <= model.len() - start {
                    let expected = (start..start + count).find(|&i| model[i] == value);
                    assert_eq!(result.unwrap(), expected);
                } else {
                    assert!(result.is_err());
                }
            }

            BitVectorOperation::LastIndexOf(value, start, count) => {
                let result = bv.last_index_of(value, start, count);
                if start <= model.len() && count <= model.len() - start {
                    let expected = (start..start + count).rev().find(|&i| model[i] == value);
                    assert_eq!(result.unwrap(), expected);
                } else {
                    assert!(result.is_err());
                }
            }

            BitVectorOperation::Encode => {
                let mut buf = BytesMut::new();
                bv.write(&mut buf).unwrap();
                assert_eq!(buf.len(), bv.encode_size());
                let decoded = BitVector::read(&mut buf.as_ref(), MAX_LEN).unwrap();
                assert_eq!(decoded, bv);
            }

            BitVectorOperation::ToBytes => {
                let bytes = bv.to_bytes().unwrap();
                let decoded = BitVector::from_bytes(&bytes).unwrap();
                assert_eq!(decoded.len(), model.len().div_ceil(8) * 8);
                for (i, &bit) in model.iter().enumerate() {
                    assert_eq!(decoded.get(i).unwrap(), bit);
                }
                assert_eq!(decoded.count_ones().unwrap(), bv.count_ones().unwrap());
            }
        }

        assert_eq!(bv.len(), model.len());
        assert_eq!(
            bv.count_ones().unwrap(),
            model.iter().filter(|&&bit| bit).count()
        );
    }

    assert!(bv.iter().eq(model.iter().copied()));
    bv.dispose();
    assert!(bv.is_disposed());
    assert!(bv.count_ones().is_err());
}

fn binary_op(
    bv: &mut BitVector,
    model: &mut [bool],
    other: Vec<bool>,
    op: fn(&mut BitVector, &BitVector) -> Result<(), Error>,
    model_op: fn(bool, bool) -> bool,
) {
    let other_bv = BitVector::from_bools(&other).unwrap();
    if other.len() == model.len() {
        op(bv, &other_bv).unwrap();
        for (bit, other) in model.iter_mut().zip(other) {
            *bit = model_op(*bit, other);
        }
    } else {
        assert_eq!(
            op(bv, &other_bv).unwrap_err(),
            Error::SizeMismatch(model.len(), other.len())
        );
    }
}

fuzz_target!(|input: FuzzInput| {
    fuzz(input);
});
