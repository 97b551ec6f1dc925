//! MILENAGE authentication functions, 3GPP TS 35.206.
//!
//! Only the network side functions needed to re-derive an authentication
//! vector are provided: f1 (MAC-A) and f2345 (RES, CK, IK, AK).

use aes::Aes128;
use aes::cipher::{BlockEncrypt, KeyInit, generic_array::GenericArray};

pub const BLOCK_SIZE: usize = 16;

type Block = [u8; BLOCK_SIZE];

// c1..c4 from TS 35.206 section 4.1; only the last byte differs
const C1: u8 = 0x00;
const C2: u8 = 0x01;
const C3: u8 = 0x02;
const C4: u8 = 0x04;

// rotations in bits
const R1: u32 = 64;
const R2: u32 = 0;
const R3: u32 = 32;
const R4: u32 = 64;

pub struct Milenage {
    cipher: Aes128,
    opc: Block,
}

/// Output of f2345 for a single RAND.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct F2345 {
    pub res: [u8; 8],
    pub ck: [u8; 16],
    pub ik: [u8; 16],
    pub ak: [u8; 6],
}

impl Milenage {
    pub fn with_opc(k: &Block, opc: &Block) -> Self {
        Self {
            cipher: Aes128::new(GenericArray::from_slice(k)),
            opc: *opc,
        }
    }

    /// Derives OPc = OP xor E_K(OP) first.
    pub fn with_op(k: &Block, op: &Block) -> Self {
        Self::with_opc(k, &compute_opc(k, op))
    }

    pub fn opc(&self) -> &Block {
        &self.opc
    }

    fn encrypt(&self, block: Block) -> Block {
        let mut block = GenericArray::clone_from_slice(&block);
        self.cipher.encrypt_block(&mut block);
        let mut out = [0u8; BLOCK_SIZE];
        out.copy_from_slice(&block);
        out
    }

    fn temp(&self, rand: &Block) -> Block {
        self.encrypt(xor(rand, &self.opc))
    }

    /// OUTn = E_K(rot(input xor OPc, r) xor extra xor c) xor OPc. f1 feeds IN1
    /// with TEMP as `extra`, f2..f4 feed TEMP itself and a zero `extra`.
    fn out(&self, input: &Block, extra: &Block, rotation: u32, constant: u8) -> Block {
        let mut block = rotate(&xor(input, &self.opc), rotation);
        block = xor(&block, extra);
        block[BLOCK_SIZE - 1] ^= constant;
        xor(&self.encrypt(block), &self.opc)
    }

    /// f1: network authentication code MAC-A.
    pub fn f1(&self, rand: &Block, sqn: &[u8; 6], amf: &[u8; 2]) -> [u8; 8] {
        let temp = self.temp(rand);
        let mut in1 = [0u8; BLOCK_SIZE];
        in1[0..6].copy_from_slice(sqn);
        in1[6..8].copy_from_slice(amf);
        in1[8..14].copy_from_slice(sqn);
        in1[14..16].copy_from_slice(amf);
        let out1 = self.out(&in1, &temp, R1, C1);
        let mut mac = [0u8; 8];
        mac.copy_from_slice(&out1[0..8]);
        mac
    }

    /// f2, f3, f4 and f5 in one pass over the same TEMP.
    pub fn f2345(&self, rand: &Block) -> F2345 {
        let temp = self.temp(rand);
        let zero = [0u8; BLOCK_SIZE];
        let out2 = self.out(&temp, &zero, R2, C2);
        let out3 = self.out(&temp, &zero, R3, C3);
        let out4 = self.out(&temp, &zero, R4, C4);

        let mut res = [0u8; 8];
        res.copy_from_slice(&out2[8..16]);
        let mut ak = [0u8; 6];
        ak.copy_from_slice(&out2[0..6]);
        F2345 {
            res,
            ck: out3,
            ik: out4,
            ak,
        }
    }
}

pub fn compute_opc(k: &Block, op: &Block) -> Block {
    let cipher = Aes128::new(GenericArray::from_slice(k));
    let mut block = GenericArray::clone_from_slice(op);
    cipher.encrypt_block(&mut block);
    let mut encrypted = [0u8; BLOCK_SIZE];
    encrypted.copy_from_slice(&block);
    xor(op, &encrypted)
}

fn xor(a: &Block, b: &Block) -> Block {
    let mut out = [0u8; BLOCK_SIZE];
    for (o, (x, y)) in out.iter_mut().zip(a.iter().zip(b)) {
        *o = x ^ y;
    }
    out
}

/// Cyclic left rotation of a 128-bit big-endian block.
fn rotate(block: &Block, bits: u32) -> Block {
    u128::from_be_bytes(*block).rotate_left(bits).to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(s: &str) -> Block {
        hex::decode(s).unwrap().try_into().unwrap()
    }

    // TS 35.207 test set 1
    #[test]
    fn test_set_1() {
        let k = block("465b5ce8b199b49faa5f0a2ee238a6bc");
        let rand = block("23553cbe9637a89d218ae64dae47bf35");
        let op = block("cdc202d5123e20f62b6d676ac72cb318");
        let sqn = [0xff, 0x9b, 0xb4, 0xd0, 0xb6, 0x07];
        let amf = [0xb9, 0xb9];

        let m = Milenage::with_op(&k, &op);
        assert_eq!(m.opc(), &block("cd63cb71954a9f4e48a5994e37a02baf"));
        assert_eq!(hex::encode(m.f1(&rand, &sqn, &amf)), "4a9ffac354dfafb3");

        let out = m.f2345(&rand);
        assert_eq!(hex::encode(out.res), "a54211d5e3ba50bf");
        assert_eq!(hex::encode(out.ck), "b40ba9a3c58b2a05bbf0d987b21bf8cb");
        assert_eq!(hex::encode(out.ik), "f769bcd751044604127672711c6d3441");
        assert_eq!(hex::encode(out.ak), "aa689c648370");
    }

    // TS 35.207 test set 3
    #[test]
    fn test_set_3_with_opc() {
        let k = block("fec86ba6eb707ed08905757b1bb44b8f");
        let rand = block("9f7c8d021accf4db213ccff0c7f71a6a");
        let opc = block("1006020f0a478bf6b699f15c062e42b3");
        let sqn = [0x9d, 0x02, 0x77, 0x59, 0x5f, 0xfc];
        let amf = [0x72, 0x5c];

        let m = Milenage::with_opc(&k, &opc);
        assert_eq!(hex::encode(m.f1(&rand, &sqn, &amf)), "9cabc3e99baf7281");
        let out = m.f2345(&rand);
        assert_eq!(hex::encode(out.res), "8011c48c0c214ed2");
        assert_eq!(hex::encode(out.ck), "5dbdbb2954e8f3cde665b046179a5098");
        assert_eq!(hex::encode(out.ik), "59a92d3b476a0443487055cf88b2307b");
        assert_eq!(hex::encode(out.ak), "33484dc2136b");
    }

    #[test]
    fn test_rotate() {
        let mut b = [0u8; BLOCK_SIZE];
        b[0] = 0x80;
        let r = rotate(&b, 8);
        assert_eq!(r[BLOCK_SIZE - 1], 0x80);
        assert_eq!(rotate(&b, 0), b);
    }
}
