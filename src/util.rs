use crate::Addr;

/// offset an address by a signed delta.
/// returns None when the result would fall outside of the address space.
pub fn addr_add_signed(addr: Addr, delta: i64) -> Option<Addr> {
    if delta >= 0 {
        addr.checked_add(delta as u64)
    } else if delta.unsigned_abs() > addr {
        // this would underflow, such as a jump before the first instruction.
        None
    } else {
        Some(addr - delta.unsigned_abs())
    }
}

/// number of decimal digits used to print the given value.
/// zero is printed with no padding, so it has zero digits here.
pub fn count_digits(mut n: u64) -> usize {
    let mut digits = 0;
    while n > 0 {
        n /= 10;
        digits += 1;
    }
    digits
}
