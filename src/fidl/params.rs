// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Parameter Walking
//!
//! Call parameters are described by independent `(offset, size)` pairs
//! that need not be sorted. The walker visits them in wire order: at each
//! step it takes the parameter with the smallest offset at or past the
//! cursor, consumes exactly its size, and moves the cursor to its end.
//! Walking stops when no parameter is left past the cursor, which
//! tolerates trailing padding. A zero-sized parameter may sit exactly at
//! the end of the region.
//!
//! A parameter that starts before the cursor overlaps its predecessor;
//! it is never reached and the walk fails instead of skipping it.

use alloc::vec::Vec;
use crate::fidl::error::{Error, Result};

/// Declared position of one parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamDesc {
    /// Byte offset in the payload
    pub offset: usize,

    /// Byte size
    pub size: usize,
}

impl ParamDesc {
    /// Describe a parameter
    pub const fn new(offset: usize, size: usize) -> Self {
        Self { offset, size }
    }
}

/// One parameter located in a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param<'a> {
    /// Index into the descriptor list
    pub index: usize,

    /// Byte offset in the payload
    pub offset: usize,

    /// The parameter's bytes
    pub bytes: &'a [u8],
}

/// Locate every parameter of `params` in `payload[..total_size]`
///
/// Parameters are returned in wire order.
///
/// # Returns
///
/// - `OutOfRange` if `total_size` exceeds the payload
/// - `MalformedParams` if two parameters share an offset, overlap, run
///   past `total_size`, or are left unvisited
pub fn walk_params<'a>(payload: &'a [u8], total_size: usize, params: &[ParamDesc]) -> Result<Vec<Param<'a>>> {
    let region = payload.get(..total_size).ok_or(Error::OutOfRange)?;
    let mut visited = Vec::with_capacity(params.len());
    let mut cursor = 0usize;

    while cursor <= total_size {
        let mut best: Option<usize> = None;
        for (index, param) in params.iter().enumerate() {
            if param.offset < cursor {
                continue;
            }
            match best {
                Some(current) if params[current].offset == param.offset => {
                    return Err(Error::MalformedParams);
                }
                Some(current) if params[current].offset < param.offset => {}
                _ => best = Some(index),
            }
        }
        let Some(index) = best else {
            break;
        };

        let desc = params[index];
        let end = desc.offset.checked_add(desc.size).ok_or(Error::MalformedParams)?;
        let bytes = region.get(desc.offset..end).ok_or(Error::MalformedParams)?;
        visited.push(Param {
            index,
            offset: desc.offset,
            bytes,
        });
        // A zero-sized parameter still has to move the cursor.
        cursor = end.max(desc.offset + 1);
    }

    if visited.len() != params.len() {
        log::debug!("{} of {} parameters unreachable", params.len() - visited.len(), params.len());
        return Err(Error::MalformedParams);
    }
    Ok(visited)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: [u8; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];

    #[test]
    fn test_walk_out_of_declaration_order() {
        let params = [ParamDesc::new(8, 4), ParamDesc::new(0, 4), ParamDesc::new(4, 2)];
        let walked = walk_params(&PAYLOAD, 16, &params).unwrap();

        let order: Vec<usize> = walked.iter().map(|p| p.index).collect();
        assert_eq!(order, [1, 2, 0]);
        assert_eq!(walked[0].bytes, &[0, 1, 2, 3]);
        assert_eq!(walked[1].bytes, &[4, 5]);
        assert_eq!(walked[2].bytes, &[8, 9, 10, 11]);
    }

    #[test]
    fn test_walk_tolerates_trailing_padding() {
        let params = [ParamDesc::new(0, 2)];
        let walked = walk_params(&PAYLOAD, 8, &params).unwrap();
        assert_eq!(walked.len(), 1);
        assert_eq!(walked[0].offset, 0);
    }

    #[test]
    fn test_walk_rejects_overlap() {
        let params = [ParamDesc::new(0, 8), ParamDesc::new(4, 4)];
        assert_eq!(walk_params(&PAYLOAD, 16, &params), Err(Error::MalformedParams));
    }

    #[test]
    fn test_walk_rejects_duplicate_offset() {
        let params = [ParamDesc::new(4, 2), ParamDesc::new(4, 2)];
        assert_eq!(walk_params(&PAYLOAD, 16, &params), Err(Error::MalformedParams));
    }

    #[test]
    fn test_walk_rejects_overrun() {
        let params = [ParamDesc::new(12, 8)];
        assert_eq!(walk_params(&PAYLOAD, 16, &params), Err(Error::MalformedParams));

        // Parameter beyond the declared size is never reached.
        let params = [ParamDesc::new(0, 4), ParamDesc::new(10, 2)];
        assert_eq!(walk_params(&PAYLOAD, 8, &params), Err(Error::MalformedParams));
    }

    #[test]
    fn test_walk_size_past_payload() {
        assert_eq!(walk_params(&PAYLOAD, 17, &[]), Err(Error::OutOfRange));
        assert_eq!(walk_params(&PAYLOAD, 16, &[]).unwrap(), Vec::new());
    }

    #[test]
    fn test_walk_zero_sized_param() {
        let params = [ParamDesc::new(0, 0), ParamDesc::new(0, 4)];
        assert_eq!(walk_params(&PAYLOAD, 4, &params), Err(Error::MalformedParams));

        let params = [ParamDesc::new(2, 0), ParamDesc::new(0, 2)];
        let walked = walk_params(&PAYLOAD, 4, &params).unwrap();
        assert_eq!(walked.len(), 2);
        assert!(walked[1].bytes.is_empty());
    }

    #[test]
    fn test_walk_zero_sized_param_at_end() {
        let params = [ParamDesc::new(0, 4), ParamDesc::new(4, 0)];
        let walked = walk_params(&PAYLOAD, 4, &params).unwrap();
        assert_eq!(walked.len(), 2);
        assert_eq!(walked[1].index, 1);
        assert_eq!(walked[1].offset, 4);
        assert!(walked[1].bytes.is_empty());

        // Anything with a size at the end still overruns.
        let params = [ParamDesc::new(0, 4), ParamDesc::new(4, 1)];
        assert_eq!(walk_params(&PAYLOAD, 4, &params), Err(Error::MalformedParams));
    }
}
