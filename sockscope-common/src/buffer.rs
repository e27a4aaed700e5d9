/// Fixed capacity byte buffer used as scratch space for captured payloads
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct Buffer<const N: usize> {
    pub buf: [u8; N],
    len: usize,
}

impl<const N: usize> Default for Buffer<N> {
    fn default() -> Self {
        Self {
            buf: [0; N],
            len: 0,
        }
    }
}

impl<const N: usize> core::ops::Index<usize> for Buffer<N> {
    type Output = u8;
    fn index(&self, index: usize) -> &Self::Output {
        &self.buf[index]
    }
}

impl<const N: usize> Buffer<N> {
    pub fn new() -> Self {
        Default::default()
    }

    pub const fn const_default() -> Self {
        Self {
            buf: [0; N],
            len: 0,
        }
    }

    #[inline(always)]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len()]
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline(always)]
    pub fn is_full(&self) -> bool {
        self.space_left() == 0
    }

    #[inline(always)]
    pub fn space_left(&self) -> usize {
        N - self.len
    }

    #[inline(always)]
    pub fn reset(&mut self) {
        for i in 0..N {
            if i == self.len {
                break;
            }
            self.buf[i] = 0;
        }
        self.len = 0;
    }

    /// Resets the buffer and lets `reader` copy at most `cap` bytes into
    /// it (never more than `N`). The reader returns how many bytes it
    /// wrote; the buffer length is set to that value, capped.
    #[inline(always)]
    pub fn fill_with<F>(&mut self, cap: usize, reader: F) -> usize
    where
        F: FnOnce(&mut [u8]) -> usize,
    {
        self.reset();
        let cap = core::cmp::min(cap, N);
        let copied = reader(&mut self.buf[..cap]);
        self.len = core::cmp::min(copied, cap);
        self.len
    }

    /// Leading `n` bytes of the captured data (less if not enough)
    #[inline(always)]
    pub fn prefix(&self, n: usize) -> &[u8] {
        &self.buf[..core::cmp::min(n, self.len)]
    }
}
