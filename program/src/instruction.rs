// Solotto - Instructions
use std::mem::size_of;

use crate::{error::LotteryError, vrf::RequestId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LotteryInstruction {
    /// Enter the current round
    ///
    /// Caller: the entrant, who pays `amount` lamports
    EnterLottery {
        /// Payment in lamports, at least the entrance fee
        amount: u64,
    },

    /// Close entries and request randomness if upkeep is needed
    ///
    /// Caller: anyone (the predicate is re-checked, the data is ignored)
    PerformUpkeep {
        /// Opaque keeper payload
        perform_data: Vec<u8>,
    },

    /// Deliver randomness for the pending request
    ///
    /// Caller: the VRF coordinator
    FulfillRandomWords {
        /// Id returned when the request was issued
        request_id: RequestId,
        /// Random words, the first one picks the winner
        random_words: Vec<u64>,
    },
}

impl LotteryInstruction {
    /// Unpacks a byte buffer into a LotteryInstruction
    pub fn unpack(input: &[u8]) -> Result<Self, LotteryError> {
        let (tag, rest) = input
            .split_first()
            .ok_or(LotteryError::InvalidInstruction)?;

        Ok(match tag {
            0 => {
                let (amount, rest) = Self::unpack_u64(rest)?;
                if !rest.is_empty() {
                    return Err(LotteryError::InvalidInstruction);
                }
                Self::EnterLottery { amount }
            }
            1 => {
                let (len, rest) = Self::unpack_u32(rest)?;
                if rest.len() != len as usize {
                    return Err(LotteryError::InvalidInstruction);
                }
                Self::PerformUpkeep {
                    perform_data: rest.to_vec(),
                }
            }
            2 => {
                let (request_id, rest) = Self::unpack_u64(rest)?;
                let (count, rest) = Self::unpack_u32(rest)?;
                let expected = (count as usize)
                    .checked_mul(size_of::<u64>())
                    .ok_or(LotteryError::InvalidInstruction)?;
                if rest.len() != expected {
                    return Err(LotteryError::InvalidInstruction);
                }
                let random_words = rest
                    .chunks_exact(size_of::<u64>())
                    .map(|chunk| {
                        chunk
                            .try_into()
                            .map(u64::from_le_bytes)
                            .map_err(|_| LotteryError::InvalidInstruction)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Self::FulfillRandomWords {
                    request_id,
                    random_words,
                }
            }
            _ => return Err(LotteryError::InvalidInstruction),
        })
    }

    /// Packs a LotteryInstruction into a byte buffer
    pub fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(size_of::<Self>());
        match self {
            Self::EnterLottery { amount } => {
                buf.push(0);
                buf.extend_from_slice(&amount.to_le_bytes());
            }
            Self::PerformUpkeep { perform_data } => {
                buf.push(1);
                buf.extend_from_slice(&(perform_data.len() as u32).to_le_bytes());
                buf.extend_from_slice(perform_data);
            }
            Self::FulfillRandomWords {
                request_id,
                random_words,
            } => {
                buf.push(2);
                buf.extend_from_slice(&request_id.to_le_bytes());
                buf.extend_from_slice(&(random_words.len() as u32).to_le_bytes());
                for word in random_words {
                    buf.extend_from_slice(&word.to_le_bytes());
                }
            }
        }
        buf
    }

    fn unpack_u64(input: &[u8]) -> Result<(u64, &[u8]), LotteryError> {
        let value = input
            .get(..8)
            .and_then(|slice| slice.try_into().ok())
            .map(u64::from_le_bytes)
            .ok_or(LotteryError::InvalidInstruction)?;
        Ok((value, &input[8..]))
    }

    fn unpack_u32(input: &[u8]) -> Result<(u32, &[u8]), LotteryError> {
        let value = input
            .get(..4)
            .and_then(|slice| slice.try_into().ok())
            .map(u32::from_le_bytes)
            .ok_or(LotteryError::InvalidInstruction)?;
        Ok((value, &input[4..]))
    }
}
