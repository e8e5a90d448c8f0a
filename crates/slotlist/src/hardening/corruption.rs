use core::hint::black_box;

/// A freelist link failed validation. Never returns.
///
/// The slot size and the raw stored words are kept live on the stack and
/// printed, so both the crash report and stderr show what was overwritten.
/// `shadow` is `None` when the build stores no shadow word.
#[cold]
#[inline(never)]
pub fn freelist_corruption_detected(
    slot_size: usize,
    encoded_next: usize,
    shadow: Option<usize>,
) -> ! {
    let slot_size = black_box(slot_size);
    let encoded_next = black_box(encoded_next);
    let shadow = black_box(shadow);
    match shadow {
        Some(shadow) => super::abort_with_args(format_args!(
            "slotlist: freelist corruption detected (slot_size={}, encoded_next={:#x}, shadow={:#x})\n",
            slot_size, encoded_next, shadow
        )),
        None => super::abort_with_args(format_args!(
            "slotlist: freelist corruption detected (slot_size={}, encoded_next={:#x})\n",
            slot_size, encoded_next
        )),
    }
}
