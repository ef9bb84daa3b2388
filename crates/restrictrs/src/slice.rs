//! Indexing and slicing for Python sequences.
//!
//! All slicing goes through [`indices`], which resolves a slice against a
//! sequence length the way Python's `slice.indices()` does. Reads, slice
//! assignment and slice deletion then walk the same resolved positions.

use crate::error::{Error, Result};
use crate::value::{PyValue, SliceValue};

/// A slice resolved against a concrete length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl Resolved {
    /// The positions the slice selects, in order.
    pub fn positions(self) -> impl Iterator<Item = usize> {
        let Resolved { start, stop, step } = self;
        let mut i = start;
        std::iter::from_fn(move || {
            let inside = if step > 0 { i < stop } else { i > stop };
            if !inside {
                return None;
            }
            let pos = i as usize;
            i += step;
            Some(pos)
        })
    }
}

/// Resolve `slice` against a sequence of `len` items.
pub fn indices(slice: &SliceValue, len: usize) -> Result<Resolved> {
    let len = len as i64;
    let step = slice.step.unwrap_or(1);
    if step == 0 {
        return Err(Error::ValueError("slice step cannot be zero".to_string()));
    }

    let (lower, upper) = if step > 0 { (0, len) } else { (-1, len - 1) };
    let clamp = |bound: i64| -> i64 {
        if bound < 0 {
            (bound + len).max(lower)
        } else {
            bound.min(upper)
        }
    };

    let start = slice.start.map_or(if step > 0 { lower } else { upper }, clamp);
    let stop = slice.stop.map_or(if step > 0 { upper } else { lower }, clamp);
    Ok(Resolved { start, stop, step })
}

/// Resolve a possibly negative index, or fail with `IndexError`.
pub fn normalize_index(index: i64, len: usize, type_name: &str) -> Result<usize> {
    let actual = if index < 0 { index + len as i64 } else { index };
    if actual < 0 || actual >= len as i64 {
        return Err(Error::IndexError(format!("{} index out of range", type_name)));
    }
    Ok(actual as usize)
}

/// Read `items[slice]`.
pub fn get_slice(items: &[PyValue], slice: &SliceValue) -> Result<Vec<PyValue>> {
    let resolved = indices(slice, items.len())?;
    Ok(resolved.positions().map(|i| items[i].clone()).collect())
}

/// Read `s[slice]`, counting characters rather than bytes.
pub fn slice_string(s: &str, slice: &SliceValue) -> Result<String> {
    let chars: Vec<char> = s.chars().collect();
    let resolved = indices(slice, chars.len())?;
    Ok(resolved.positions().map(|i| chars[i]).collect())
}

/// Read `s[index]` as a one-character string.
pub fn string_index(s: &str, index: i64) -> Result<PyValue> {
    let len = s.chars().count();
    let idx = normalize_index(index, len, "string")?;
    Ok(s.chars()
        .nth(idx)
        .map(|c| PyValue::Str(c.to_string()))
        .unwrap_or(PyValue::None))
}

/// `items[slice] = values`.
///
/// A contiguous slice may change the list's length; an extended slice
/// (step other than 1) must be replaced by exactly as many values as it
/// selects.
pub fn set_slice(items: &mut Vec<PyValue>, slice: &SliceValue, values: Vec<PyValue>) -> Result<()> {
    let resolved = indices(slice, items.len())?;
    if resolved.step == 1 {
        let start = resolved.start as usize;
        let stop = (resolved.stop.max(resolved.start)) as usize;
        items.splice(start..stop, values);
        return Ok(());
    }

    let positions: Vec<usize> = resolved.positions().collect();
    if positions.len() != values.len() {
        return Err(Error::ValueError(format!(
            "attempt to assign sequence of size {} to extended slice of size {}",
            values.len(),
            positions.len()
        )));
    }
    for (pos, value) in positions.into_iter().zip(values) {
        items[pos] = value;
    }
    Ok(())
}

/// `del items[slice]`.
pub fn delete_slice(items: &mut Vec<PyValue>, slice: &SliceValue) -> Result<()> {
    let resolved = indices(slice, items.len())?;
    let mut positions: Vec<usize> = resolved.positions().collect();
    positions.sort_unstable();
    for pos in positions.into_iter().rev() {
        items.remove(pos);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn slice(start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> SliceValue {
        SliceValue { start, stop, step }
    }

    fn ints(items: &[PyValue]) -> Vec<i64> {
        items.iter().filter_map(PyValue::as_int).collect()
    }

    #[test]
    fn test_indices_match_python() {
        assert_eq!(
            indices(&slice(None, None, Some(-1)), 5).unwrap(),
            Resolved { start: 4, stop: -1, step: -1 }
        );
        assert_eq!(
            indices(&slice(Some(-2), Some(100), None), 5).unwrap(),
            Resolved { start: 3, stop: 5, step: 1 }
        );
        assert!(indices(&slice(None, None, Some(0)), 5).is_err());
    }

    #[test]
    fn test_get_slice() {
        let items: Vec<PyValue> = (0..6).map(PyValue::Int).collect();
        assert_eq!(ints(&get_slice(&items, &slice(Some(1), Some(4), None)).unwrap()), vec![1, 2, 3]);
        assert_eq!(ints(&get_slice(&items, &slice(None, None, Some(2))).unwrap()), vec![0, 2, 4]);
        assert_eq!(ints(&get_slice(&items, &slice(Some(4), Some(1), Some(-1))).unwrap()), vec![4, 3, 2]);
        assert_eq!(ints(&get_slice(&items, &slice(Some(-2), None, None)).unwrap()), vec![4, 5]);
        assert_eq!(slice_string("héllo", &slice(None, None, Some(-1))).unwrap(), "olléh");
    }

    #[test]
    fn test_set_and_delete_slice() {
        let mut items: Vec<PyValue> = (0..5).map(PyValue::Int).collect();
        set_slice(&mut items, &slice(Some(1), Some(3), None), vec![PyValue::Int(9)]).unwrap();
        assert_eq!(ints(&items), vec![0, 9, 3, 4]);

        delete_slice(&mut items, &slice(None, None, Some(2))).unwrap();
        assert_eq!(ints(&items), vec![9, 4]);

        let err = set_slice(&mut items, &slice(None, None, Some(-1)), vec![]).unwrap_err();
        assert!(matches!(err, Error::ValueError(_)));
    }

    #[test]
    fn test_normalize_index() {
        assert_eq!(normalize_index(-1, 3, "list").unwrap(), 2);
        assert!(matches!(normalize_index(3, 3, "list"), Err(Error::IndexError(_))));
    }
}
