mod cond;
mod imm;
