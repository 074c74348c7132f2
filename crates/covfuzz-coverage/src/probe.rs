//! Instrumentation entry points.
//!
//! Injected target code calls one of these per executed branch site. Each
//! forwards to the calling thread's [`CoverageContext`](crate::CoverageContext)
//! and is a no-op when the thread is not tracked.

use crate::tracker::with_current;

pub fn if_eq(value: i32, site: i32) {
    with_current(|ctx| ctx.if_eq(value, site));
}

pub fn if_ne(value: i32, site: i32) {
    with_current(|ctx| ctx.if_ne(value, site));
}

pub fn if_lt(value: i32, site: i32) {
    with_current(|ctx| ctx.if_lt(value, site));
}

pub fn if_le(value: i32, site: i32) {
    with_current(|ctx| ctx.if_le(value, site));
}

pub fn if_gt(value: i32, site: i32) {
    with_current(|ctx| ctx.if_gt(value, site));
}

pub fn if_ge(value: i32, site: i32) {
    with_current(|ctx| ctx.if_ge(value, site));
}

pub fn if_icmp_eq(lhs: i32, rhs: i32, site: i32) {
    with_current(|ctx| ctx.if_icmp_eq(lhs, rhs, site));
}

pub fn if_icmp_ne(lhs: i32, rhs: i32, site: i32) {
    with_current(|ctx| ctx.if_icmp_ne(lhs, rhs, site));
}

pub fn if_icmp_lt(lhs: i32, rhs: i32, site: i32) {
    with_current(|ctx| ctx.if_icmp_lt(lhs, rhs, site));
}

pub fn if_icmp_le(lhs: i32, rhs: i32, site: i32) {
    with_current(|ctx| ctx.if_icmp_le(lhs, rhs, site));
}

pub fn if_icmp_gt(lhs: i32, rhs: i32, site: i32) {
    with_current(|ctx| ctx.if_icmp_gt(lhs, rhs, site));
}

pub fn if_icmp_ge(lhs: i32, rhs: i32, site: i32) {
    with_current(|ctx| ctx.if_icmp_ge(lhs, rhs, site));
}

pub fn if_acmp_eq<T: ?Sized>(lhs: &T, rhs: &T, site: i32) {
    with_current(|ctx| ctx.if_acmp_eq(lhs, rhs, site));
}

pub fn if_acmp_ne<T: ?Sized>(lhs: &T, rhs: &T, site: i32) {
    with_current(|ctx| ctx.if_acmp_ne(lhs, rhs, site));
}

pub fn if_null<T: ?Sized>(value: Option<&T>, site: i32) {
    with_current(|ctx| ctx.if_null(value, site));
}

pub fn if_non_null<T: ?Sized>(value: Option<&T>, site: i32) {
    with_current(|ctx| ctx.if_non_null(value, site));
}

pub fn table_switch(value: i32, min: i32, max: i32, site: i32) {
    with_current(|ctx| ctx.table_switch(value, min, max, site));
}

pub fn lookup_switch(value: i32, keys: &[i32], site: i32) {
    with_current(|ctx| ctx.lookup_switch(value, keys, site));
}

pub fn catch_entry<E: ?Sized>(error: &E, site: i32) {
    with_current(|ctx| ctx.catch_entry(error, site));
}
