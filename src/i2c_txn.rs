//! Interrupt-driven I2C transaction engine.
//!
//! A singly linked FIFO of fixed-pool transactions driven one step at a time
//! from the bus interrupt. Ownership of a transaction moves from the caller
//! to the bus ISR context at enqueue time and back via its callback; nothing
//! here blocks, except `wait`, which is meant to be called from task (not
//! interrupt) context.

use crate::consts::MAX_QUEUEING_TRANSACTIONS;
use crate::error::Error;

/// Longest burst this engine moves in one transaction. Covers the widest
/// sensor burst read (14 bytes: accelerometer + gyroscope in one go) with
/// room to spare.
pub const MAX_TXN_LEN: usize = 16;

/// A transaction's user callback. Plain function pointers, not boxed
/// closures — nothing here captures state, matching the bus ISR's inability
/// to carry an environment across interrupt boundaries.
pub type TxnCallback = fn(Result<(), Error>, &[u8]);

/// Mirrors the hardware actions the original bus driver issued through
/// `I2CMasterControl`/`I2CMasterDataPut`/`I2CMasterDataGet`. Implemented
/// against `stm32-hal2`'s I2C peripheral in `main.rs`; implemented against a
/// fake in tests.
pub trait I2cBus {
    fn set_slave_addr(&mut self, addr: u8, receive: bool);
    fn put(&mut self, byte: u8);
    fn get(&mut self) -> u8;
    fn burst_send_start(&mut self);
    fn burst_send_cont(&mut self);
    fn burst_send_finish(&mut self);
    fn single_send(&mut self);
    fn single_receive(&mut self);
    fn burst_receive_start(&mut self);
    fn burst_receive_cont(&mut self);
    fn burst_receive_finish(&mut self);
    /// Whether the bus reported a NACK/arbitration-loss condition since the
    /// last check.
    fn had_error(&mut self) -> bool;
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum TxnState {
    Idle,
    WriteNext,
    WriteFinal,
    ReadOne,
    ReadFirst,
    ReadNext,
    ReadFinal,
    ReadWait,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
enum Direction {
    Write,
    Read,
    Both,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
enum Kind {
    Reg,
    Raw,
}

struct Transaction {
    addr: u8,
    register: u8,
    mask: u8,
    direction: Direction,
    kind: Kind,
    data: [u8; MAX_TXN_LEN],
    len: usize,
    remaining: usize,
    pos: usize,
    state: TxnState,
    callback: Option<TxnCallback>,
    next: Option<u8>,
}

impl Transaction {
    fn blank() -> Self {
        Self {
            addr: 0,
            register: 0,
            mask: 0,
            direction: Direction::Read,
            kind: Kind::Reg,
            data: [0; MAX_TXN_LEN],
            len: 0,
            remaining: 0,
            pos: 0,
            state: TxnState::Idle,
            callback: None,
            next: None,
        }
    }
}

/// Fixed-pool FIFO of in-flight I2C transactions, plus the FSM that drives
/// the head transaction to completion one bus interrupt at a time.
pub struct TransactionQueue {
    slots: [Option<Transaction>; MAX_QUEUEING_TRANSACTIONS],
    current: Option<u8>,
    last: Option<u8>,
    /// Status and payload of the most recently completed transaction,
    /// mirrors the source engine's `errorCode` static plus `DefaultCallback`
    /// used by `WaitI2CTransacs` for transactions the caller didn't attach
    /// its own callback to.
    last_status: Result<(), Error>,
    last_frame: [u8; MAX_TXN_LEN],
    last_len: usize,
}

impl TransactionQueue {
    pub const fn new() -> Self {
        const NONE: Option<Transaction> = None;
        Self {
            slots: [NONE; MAX_QUEUEING_TRANSACTIONS],
            current: None,
            last: None,
            last_status: Ok(()),
            last_frame: [0; MAX_TXN_LEN],
            last_len: 0,
        }
    }

    /// Payload and status of the most recently completed transaction. Meant
    /// to be read by a task-context caller right after `wait` returns, for
    /// the synchronous read path (boot-time configuration, calibration).
    pub fn last_frame(&self) -> (&[u8], Result<(), Error>) {
        (&self.last_frame[..self.last_len], self.last_status)
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_none()
    }

    fn alloc(&mut self) -> u8 {
        if let Some(free) = self.slots.iter().position(|s| s.is_none()) {
            return free as u8;
        }
        self.flush(Error::BusQueueFull);
        0
    }

    /// Invokes every queued transaction's callback with `reason`, then
    /// empties the pool. Mirrors `AddTransac`'s overflow handling.
    fn flush(&mut self, reason: Error) {
        let mut idx = self.current;
        while let Some(i) = idx {
            if let Some(txn) = self.slots[i as usize].take() {
                if let Some(cb) = txn.callback {
                    cb(Err(reason), &[]);
                }
                idx = txn.next;
            } else {
                break;
            }
        }
        self.current = None;
        self.last = None;
    }

    fn enqueue(&mut self, txn: Transaction) -> u8 {
        let idx = self.alloc();
        let was_empty = self.current.is_none();
        if let Some(last_idx) = self.last {
            if let Some(last) = self.slots[last_idx as usize].as_mut() {
                last.next = Some(idx);
            }
        }
        self.slots[idx as usize] = Some(txn);
        self.last = Some(idx);
        if was_empty {
            self.current = Some(idx);
        }
        idx
    }

    pub fn async_write(
        &mut self,
        bus: &mut impl I2cBus,
        addr: u8,
        data: &[u8],
        callback: Option<TxnCallback>,
    ) {
        let mut txn = Transaction::blank();
        txn.addr = addr;
        txn.direction = Direction::Write;
        txn.kind = Kind::Raw;
        txn.len = data.len().min(MAX_TXN_LEN);
        txn.data[..txn.len].copy_from_slice(&data[..txn.len]);
        txn.remaining = txn.len;
        txn.callback = callback;
        let was_empty = self.current.is_none();
        let idx = self.enqueue(txn);
        if was_empty {
            self.begin_write(bus, idx);
        }
    }

    pub fn async_reg_write(
        &mut self,
        bus: &mut impl I2cBus,
        addr: u8,
        register: u8,
        data: &[u8],
        callback: Option<TxnCallback>,
    ) {
        let mut txn = Transaction::blank();
        txn.addr = addr;
        txn.register = register;
        txn.direction = Direction::Write;
        txn.kind = Kind::Reg;
        txn.len = data.len().min(MAX_TXN_LEN);
        txn.data[..txn.len].copy_from_slice(&data[..txn.len]);
        txn.remaining = txn.len;
        txn.callback = callback;
        let was_empty = self.current.is_none();
        let idx = self.enqueue(txn);
        if was_empty {
            self.begin_write(bus, idx);
        }
    }

    pub fn async_reg_read(
        &mut self,
        bus: &mut impl I2cBus,
        addr: u8,
        register: u8,
        len: usize,
        callback: Option<TxnCallback>,
    ) {
        let mut txn = Transaction::blank();
        txn.addr = addr;
        txn.register = register;
        txn.direction = Direction::Read;
        txn.kind = Kind::Reg;
        txn.len = len.min(MAX_TXN_LEN);
        txn.remaining = txn.len;
        txn.callback = callback;
        let was_empty = self.current.is_none();
        let idx = self.enqueue(txn);
        if was_empty {
            self.begin_read(bus, idx);
        }
    }

    pub fn async_reg_rmw(
        &mut self,
        bus: &mut impl I2cBus,
        addr: u8,
        register: u8,
        mask: u8,
        seed: u8,
        callback: Option<TxnCallback>,
    ) {
        let mut txn = Transaction::blank();
        txn.addr = addr;
        txn.register = register;
        txn.mask = mask;
        txn.direction = Direction::Both;
        txn.kind = Kind::Reg;
        txn.len = 1;
        txn.remaining = 1;
        txn.data[0] = seed;
        txn.callback = callback;
        let was_empty = self.current.is_none();
        let idx = self.enqueue(txn);
        if was_empty {
            self.begin_read(bus, idx);
        }
    }

    fn begin_write(&mut self, bus: &mut impl I2cBus, idx: u8) {
        let txn = self.slots[idx as usize].as_mut().expect("begin_write on empty slot");
        bus.set_slave_addr(txn.addr, false);
        match txn.kind {
            Kind::Reg => {
                txn.state = if txn.remaining != 1 {
                    TxnState::WriteNext
                } else {
                    TxnState::WriteFinal
                };
                bus.put(txn.register);
                bus.burst_send_start();
            }
            Kind::Raw => {
                txn.remaining -= 1;
                if txn.remaining != 0 {
                    txn.state = if txn.remaining != 1 {
                        TxnState::WriteNext
                    } else {
                        TxnState::WriteFinal
                    };
                    bus.put(txn.data[txn.pos]);
                    txn.pos += 1;
                    bus.burst_send_start();
                } else {
                    txn.state = TxnState::Idle;
                    bus.put(txn.data[txn.pos]);
                    txn.pos += 1;
                    bus.single_send();
                }
            }
        }
    }

    fn begin_read(&mut self, bus: &mut impl I2cBus, idx: u8) {
        let txn = self.slots[idx as usize].as_mut().expect("begin_read on empty slot");
        txn.state = if txn.remaining == 1 {
            TxnState::ReadOne
        } else {
            TxnState::ReadFirst
        };
        bus.set_slave_addr(txn.addr, false);
        bus.put(txn.register);
        bus.single_send();
    }

    fn finish(&mut self, idx: u8, status: Result<(), Error>) {
        let txn = self.slots[idx as usize].take().expect("finish on empty slot");
        let next = txn.next;
        self.current = next;
        if next.is_none() {
            self.last = None;
        }
        self.last_status = status;
        self.last_len = txn.len;
        self.last_frame[..txn.len].copy_from_slice(&txn.data[..txn.len]);
        if let Some(cb) = txn.callback {
            cb(status, &txn.data[..txn.len]);
        }
    }

    /// One FSM step, called from the bus interrupt handler.
    pub fn on_interrupt(&mut self, bus: &mut impl I2cBus) {
        loop {
            let Some(idx) = self.current else { return };
            if bus.had_error() {
                self.finish(idx, Err(Error::BusUnknown));
                if let Some(next) = self.current {
                    let dir = self.slots[next as usize].as_ref().unwrap().direction;
                    if dir == Direction::Write {
                        self.begin_write(bus, next);
                    } else {
                        self.begin_read(bus, next);
                    }
                }
                return;
            }

            let state = self.slots[idx as usize].as_ref().unwrap().state;
            let mut continue_immediately = false;

            match state {
                TxnState::Idle => {
                    self.finish(idx, Ok(()));
                    if let Some(next) = self.current {
                        let dir = self.slots[next as usize].as_ref().unwrap().direction;
                        if dir == Direction::Write {
                            self.begin_write(bus, next);
                        } else {
                            self.begin_read(bus, next);
                        }
                    }
                    return;
                }
                TxnState::WriteNext => {
                    let txn = self.slots[idx as usize].as_mut().unwrap();
                    bus.put(txn.data[txn.pos]);
                    txn.pos += 1;
                    txn.remaining -= 1;
                    bus.burst_send_cont();
                    if txn.remaining == 1 {
                        txn.state = TxnState::WriteFinal;
                    }
                }
                TxnState::WriteFinal => {
                    let txn = self.slots[idx as usize].as_mut().unwrap();
                    bus.put(txn.data[txn.pos]);
                    txn.remaining -= 1;
                    bus.burst_send_finish();
                    txn.state = TxnState::Idle;
                }
                TxnState::ReadOne => {
                    let txn = self.slots[idx as usize].as_mut().unwrap();
                    bus.set_slave_addr(txn.addr, true);
                    bus.single_receive();
                    txn.state = TxnState::ReadWait;
                }
                TxnState::ReadFirst => {
                    let txn = self.slots[idx as usize].as_mut().unwrap();
                    bus.set_slave_addr(txn.addr, true);
                    bus.burst_receive_start();
                    txn.state = if txn.remaining == 2 {
                        TxnState::ReadFinal
                    } else {
                        TxnState::ReadNext
                    };
                }
                TxnState::ReadNext => {
                    let txn = self.slots[idx as usize].as_mut().unwrap();
                    txn.data[txn.pos] = bus.get();
                    txn.pos += 1;
                    txn.remaining -= 1;
                    bus.burst_receive_cont();
                    if txn.remaining == 2 {
                        txn.state = TxnState::ReadFinal;
                    }
                }
                TxnState::ReadFinal => {
                    let txn = self.slots[idx as usize].as_mut().unwrap();
                    txn.data[txn.pos] = bus.get();
                    txn.pos += 1;
                    txn.remaining -= 1;
                    bus.burst_receive_finish();
                    txn.state = TxnState::ReadWait;
                }
                TxnState::ReadWait => {
                    let direction = self.slots[idx as usize].as_ref().unwrap().direction;
                    if direction == Direction::Read {
                        let txn = self.slots[idx as usize].as_mut().unwrap();
                        txn.data[txn.pos] = bus.get();
                        txn.remaining = 0;
                        txn.state = TxnState::Idle;
                        continue_immediately = true;
                    } else {
                        let txn = self.slots[idx as usize].as_mut().unwrap();
                        let byte = bus.get() & txn.mask;
                        txn.data[0] |= byte;
                        txn.remaining = 1;
                        txn.pos = 0;
                        self.begin_write(bus, idx);
                    }
                }
            }

            if !continue_immediately {
                return;
            }
        }
    }

    /// Busy-waits (from task, not interrupt, context) until the queue
    /// drains or `max_ticks` elapses, calling `tick` once per iteration so a
    /// caller can yield or feed a simulated clock. Returns `BusTimeout` if
    /// the queue never empties.
    pub fn wait(&self, max_ticks: u32, mut tick: impl FnMut()) -> Result<(), Error> {
        let mut remaining = max_ticks;
        while self.current.is_some() {
            if remaining == 0 {
                return Err(Error::BusTimeout);
            }
            remaining -= 1;
            tick();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;
    use std::vec::Vec;

    struct FakeBus {
        to_read: Vec<u8>,
        read_pos: usize,
        written: Vec<u8>,
        error_on_next: bool,
        errored: bool,
    }

    impl FakeBus {
        fn new(to_read: &[u8]) -> Self {
            Self {
                to_read: to_read.to_vec(),
                read_pos: 0,
                written: Vec::new(),
                error_on_next: false,
                errored: false,
            }
        }
    }

    impl I2cBus for FakeBus {
        fn set_slave_addr(&mut self, _addr: u8, _receive: bool) {}
        fn put(&mut self, byte: u8) {
            self.written.push(byte);
        }
        fn get(&mut self) -> u8 {
            let b = self.to_read.get(self.read_pos).copied().unwrap_or(0);
            self.read_pos += 1;
            b
        }
        fn burst_send_start(&mut self) {}
        fn burst_send_cont(&mut self) {}
        fn burst_send_finish(&mut self) {}
        fn single_send(&mut self) {}
        fn single_receive(&mut self) {}
        fn burst_receive_start(&mut self) {}
        fn burst_receive_cont(&mut self) {}
        fn burst_receive_finish(&mut self) {}
        fn had_error(&mut self) -> bool {
            if self.error_on_next {
                self.error_on_next = false;
                self.errored = true;
                true
            } else {
                false
            }
        }
    }

    thread_local! {
        static LOG: RefCell<Vec<(Result<(), Error>, Vec<u8>)>> = RefCell::new(Vec::new());
    }

    fn record(status: Result<(), Error>, data: &[u8]) {
        LOG.with(|l| l.borrow_mut().push((status, data.to_vec())));
    }

    fn drain_log() -> Vec<(Result<(), Error>, Vec<u8>)> {
        LOG.with(|l| l.borrow_mut().drain(..).collect())
    }

    #[test]
    fn single_register_read_completes_in_order() {
        drain_log();
        let mut q = TransactionQueue::new();
        let mut bus = FakeBus::new(&[0x42]);
        q.async_reg_read(&mut bus, 0x68, 0x75, 1, Some(record));
        assert_eq!(q.is_idle(), false);
        // ReadOne -> ReadWait was set by begin_read; one interrupt resolves it.
        q.on_interrupt(&mut bus);
        assert!(q.is_idle());
        let log = drain_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].0, Ok(()));
        assert_eq!(log[0].1, vec![0x42]);
    }

    #[test]
    fn burst_register_read_completes_and_preserves_order() {
        drain_log();
        let mut q = TransactionQueue::new();
        let mut bus = FakeBus::new(&[1, 2, 3, 4, 5, 6]);
        q.async_reg_read(&mut bus, 0x1e, 0x03, 6, Some(record));
        // ReadFirst already issued by begin_read; drive through ReadNext*3, ReadFinal, ReadWait.
        while !q.is_idle() {
            q.on_interrupt(&mut bus);
        }
        let log = drain_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].1, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn three_transactions_run_in_fifo_order() {
        drain_log();
        let mut q = TransactionQueue::new();
        let mut bus = FakeBus::new(&[0xaa]);
        q.async_reg_read(&mut bus, 0x68, 0x00, 1, Some(record));
        q.async_reg_read(&mut bus, 0x68, 0x01, 1, Some(record));
        q.async_reg_read(&mut bus, 0x68, 0x02, 1, Some(record));
        while !q.is_idle() {
            q.on_interrupt(&mut bus);
        }
        assert_eq!(drain_log().len(), 3);
    }

    #[test]
    fn bus_nack_surfaces_unknown_and_queue_advances() {
        drain_log();
        let mut q = TransactionQueue::new();
        let mut bus = FakeBus::new(&[0xaa]);
        q.async_reg_read(&mut bus, 0x68, 0x00, 1, Some(record));
        q.async_reg_read(&mut bus, 0x68, 0x01, 1, Some(record));
        bus.error_on_next = true;
        q.on_interrupt(&mut bus);
        let log = drain_log();
        assert_eq!(log[0].0, Err(Error::BusUnknown));
        // the third transaction's slot should now be current and eventually complete.
        while !q.is_idle() {
            q.on_interrupt(&mut bus);
        }
    }

    #[test]
    fn queue_overflow_flushes_with_queue_full_and_restarts() {
        drain_log();
        let mut q = TransactionQueue::new();
        let mut bus = FakeBus::new(&[0]);
        // Fill every slot without draining (no on_interrupt calls), then push one more.
        for _ in 0..MAX_QUEUEING_TRANSACTIONS {
            q.async_reg_read(&mut bus, 0x68, 0x00, 1, Some(record));
        }
        q.async_reg_read(&mut bus, 0x68, 0x00, 1, Some(record));
        let log = drain_log();
        assert!(log.iter().any(|(s, _)| *s == Err(Error::BusQueueFull)));
    }

    #[test]
    fn wait_times_out_when_queue_never_drains() {
        let q = TransactionQueue::new();
        // current is None so this resolves immediately as Ok; exercise the
        // timeout branch with a queue forced non-idle via a pending read.
        let mut bus = FakeBus::new(&[0]);
        let mut q2 = TransactionQueue::new();
        q2.async_reg_read(&mut bus, 0x68, 0x00, 1, None);
        let result = q2.wait(3, || {});
        assert_eq!(result, Err(Error::BusTimeout));
        assert!(q.wait(0, || {}).is_ok());
    }
}
