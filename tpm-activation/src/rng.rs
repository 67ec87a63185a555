// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Fallible randomness for library calls that only take an infallible RNG

use rand::{CryptoRng, RngCore};

use crate::error::{ActivationError, Result};

/// Routes every draw through `try_fill_bytes` of the wrapped source and
/// keeps the first failure; the output after a failure is zeros and must be
/// discarded by the caller via [`FallibleRng::check`]
pub(crate) struct FallibleRng<'a, R: ?Sized> {
    inner: &'a mut R,
    error: Option<rand::Error>,
}

impl<'a, R: CryptoRng + RngCore + ?Sized> FallibleRng<'a, R> {
    pub(crate) fn new(inner: &'a mut R) -> Self {
        Self { inner, error: None }
    }

    /// Pass `value` through unless a draw failed while producing it
    pub(crate) fn check<T>(self, value: T) -> Result<T> {
        match self.error {
            Some(e) => Err(ActivationError::Randomness(e)),
            None => Ok(value),
        }
    }
}

impl<R: CryptoRng + RngCore + ?Sized> RngCore for FallibleRng<'_, R> {
    fn next_u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        self.fill_bytes(&mut buf);
        u32::from_le_bytes(buf)
    }

    fn next_u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        self.fill_bytes(&mut buf);
        u64::from_le_bytes(buf)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        if self.error.is_some() {
            dest.fill(0);
            return;
        }
        if let Err(e) = self.inner.try_fill_bytes(dest) {
            dest.fill(0);
            self.error = Some(e);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
        self.fill_bytes(dest);
        match &self.error {
            Some(_) => Err(rand::Error::new("randomness source failed")),
            None => Ok(()),
        }
    }
}

impl<R: CryptoRng + RngCore + ?Sized> CryptoRng for FallibleRng<'_, R> {}
