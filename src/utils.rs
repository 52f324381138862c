/// Return a reference to a 4-byte array at `offset` in `slice`
///
/// Panics if the slice is too short, so callers must have checked bounds.
#[inline]
pub(crate) fn array_ref4(slice: &[u8], offset: usize) -> &[u8; 4] {
    use std::convert::TryInto;
    slice[offset..offset + 4]
        .try_into()
        .expect("array_ref4: slice too short")
}

/// Return a reference to an 8-byte array at `offset` in `slice`
#[inline]
pub(crate) fn array_ref8(slice: &[u8], offset: usize) -> &[u8; 8] {
    use std::convert::TryInto;
    slice[offset..offset + 8]
        .try_into()
        .expect("array_ref8: slice too short")
}
