//! JVM instruction set
//!
//! Every opcode defined by JVMS §6.5 that may appear in a class file. The
//! reserved opcodes (`breakpoint`, `impdep1`, `impdep2`) are rejected at decode
//! time.
//!
//! Opcodes are organized into the usual categories:
//! - 0x00-0x14: Constants
//! - 0x15-0x35: Loads
//! - 0x36-0x56: Stores
//! - 0x57-0x5F: Stack manipulation
//! - 0x60-0x84: Arithmetic
//! - 0x85-0x93: Conversions
//! - 0x94-0xA6: Comparisons
//! - 0xA7-0xB1: Control flow
//! - 0xB2-0xC3: References
//! - 0xC4-0xC9: Extended

macro_rules! opcodes {
    ($($name:ident = $code:literal, $mnemonic:literal, $operands:expr;)*) => {
        /// JVM opcode enumeration
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $(
                #[doc = concat!("`", $mnemonic, "`")]
                $name = $code,
            )*
        }

        impl Opcode {
            /// Decode an opcode byte
            pub fn from_u8(byte: u8) -> Option<Self> {
                match byte {
                    $($code => Some(Opcode::$name),)*
                    _ => None,
                }
            }

            /// Assembler mnemonic
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$name => $mnemonic,)*
                }
            }

            /// Size of the fixed operand bytes following the opcode.
            ///
            /// `None` for the variable-length `wide`, `tableswitch` and
            /// `lookupswitch`.
            pub fn operand_size(self) -> Option<usize> {
                match self {
                    $(Opcode::$name => $operands,)*
                }
            }
        }
    };
}

opcodes! {
    // ===== Constants =====
    Nop = 0x00, "nop", Some(0);
    AconstNull = 0x01, "aconst_null", Some(0);
    IconstM1 = 0x02, "iconst_m1", Some(0);
    Iconst0 = 0x03, "iconst_0", Some(0);
    Iconst1 = 0x04, "iconst_1", Some(0);
    Iconst2 = 0x05, "iconst_2", Some(0);
    Iconst3 = 0x06, "iconst_3", Some(0);
    Iconst4 = 0x07, "iconst_4", Some(0);
    Iconst5 = 0x08, "iconst_5", Some(0);
    Lconst0 = 0x09, "lconst_0", Some(0);
    Lconst1 = 0x0A, "lconst_1", Some(0);
    Fconst0 = 0x0B, "fconst_0", Some(0);
    Fconst1 = 0x0C, "fconst_1", Some(0);
    Fconst2 = 0x0D, "fconst_2", Some(0);
    Dconst0 = 0x0E, "dconst_0", Some(0);
    Dconst1 = 0x0F, "dconst_1", Some(0);
    Bipush = 0x10, "bipush", Some(1);
    Sipush = 0x11, "sipush", Some(2);
    Ldc = 0x12, "ldc", Some(1);
    LdcW = 0x13, "ldc_w", Some(2);
    Ldc2W = 0x14, "ldc2_w", Some(2);

    // ===== Loads =====
    Iload = 0x15, "iload", Some(1);
    Lload = 0x16, "lload", Some(1);
    Fload = 0x17, "fload", Some(1);
    Dload = 0x18, "dload", Some(1);
    Aload = 0x19, "aload", Some(1);
    Iload0 = 0x1A, "iload_0", Some(0);
    Iload1 = 0x1B, "iload_1", Some(0);
    Iload2 = 0x1C, "iload_2", Some(0);
    Iload3 = 0x1D, "iload_3", Some(0);
    Lload0 = 0x1E, "lload_0", Some(0);
    Lload1 = 0x1F, "lload_1", Some(0);
    Lload2 = 0x20, "lload_2", Some(0);
    Lload3 = 0x21, "lload_3", Some(0);
    Fload0 = 0x22, "fload_0", Some(0);
    Fload1 = 0x23, "fload_1", Some(0);
    Fload2 = 0x24, "fload_2", Some(0);
    Fload3 = 0x25, "fload_3", Some(0);
    Dload0 = 0x26, "dload_0", Some(0);
    Dload1 = 0x27, "dload_1", Some(0);
    Dload2 = 0x28, "dload_2", Some(0);
    Dload3 = 0x29, "dload_3", Some(0);
    Aload0 = 0x2A, "aload_0", Some(0);
    Aload1 = 0x2B, "aload_1", Some(0);
    Aload2 = 0x2C, "aload_2", Some(0);
    Aload3 = 0x2D, "aload_3", Some(0);
    Iaload = 0x2E, "iaload", Some(0);
    Laload = 0x2F, "laload", Some(0);
    Faload = 0x30, "faload", Some(0);
    Daload = 0x31, "daload", Some(0);
    Aaload = 0x32, "aaload", Some(0);
    Baload = 0x33, "baload", Some(0);
    Caload = 0x34, "caload", Some(0);
    Saload = 0x35, "saload", Some(0);

    // ===== Stores =====
    Istore = 0x36, "istore", Some(1);
    Lstore = 0x37, "lstore", Some(1);
    Fstore = 0x38, "fstore", Some(1);
    Dstore = 0x39, "dstore", Some(1);
    Astore = 0x3A, "astore", Some(1);
    Istore0 = 0x3B, "istore_0", Some(0);
    Istore1 = 0x3C, "istore_1", Some(0);
    Istore2 = 0x3D, "istore_2", Some(0);
    Istore3 = 0x3E, "istore_3", Some(0);
    Lstore0 = 0x3F, "lstore_0", Some(0);
    Lstore1 = 0x40, "lstore_1", Some(0);
    Lstore2 = 0x41, "lstore_2", Some(0);
    Lstore3 = 0x42, "lstore_3", Some(0);
    Fstore0 = 0x43, "fstore_0", Some(0);
    Fstore1 = 0x44, "fstore_1", Some(0);
    Fstore2 = 0x45, "fstore_2", Some(0);
    Fstore3 = 0x46, "fstore_3", Some(0);
    Dstore0 = 0x47, "dstore_0", Some(0);
    Dstore1 = 0x48, "dstore_1", Some(0);
    Dstore2 = 0x49, "dstore_2", Some(0);
    Dstore3 = 0x4A, "dstore_3", Some(0);
    Astore0 = 0x4B, "astore_0", Some(0);
    Astore1 = 0x4C, "astore_1", Some(0);
    Astore2 = 0x4D, "astore_2", Some(0);
    Astore3 = 0x4E, "astore_3", Some(0);
    Iastore = 0x4F, "iastore", Some(0);
    Lastore = 0x50, "lastore", Some(0);
    Fastore = 0x51, "fastore", Some(0);
    Dastore = 0x52, "dastore", Some(0);
    Aastore = 0x53, "aastore", Some(0);
    Bastore = 0x54, "bastore", Some(0);
    Castore = 0x55, "castore", Some(0);
    Sastore = 0x56, "sastore", Some(0);

    // ===== Stack Manipulation =====
    Pop = 0x57, "pop", Some(0);
    Pop2 = 0x58, "pop2", Some(0);
    Dup = 0x59, "dup", Some(0);
    DupX1 = 0x5A, "dup_x1", Some(0);
    DupX2 = 0x5B, "dup_x2", Some(0);
    Dup2 = 0x5C, "dup2", Some(0);
    Dup2X1 = 0x5D, "dup2_x1", Some(0);
    Dup2X2 = 0x5E, "dup2_x2", Some(0);
    Swap = 0x5F, "swap", Some(0);

    // ===== Arithmetic =====
    Iadd = 0x60, "iadd", Some(0);
    Ladd = 0x61, "ladd", Some(0);
    Fadd = 0x62, "fadd", Some(0);
    Dadd = 0x63, "dadd", Some(0);
    Isub = 0x64, "isub", Some(0);
    Lsub = 0x65, "lsub", Some(0);
    Fsub = 0x66, "fsub", Some(0);
    Dsub = 0x67, "dsub", Some(0);
    Imul = 0x68, "imul", Some(0);
    Lmul = 0x69, "lmul", Some(0);
    Fmul = 0x6A, "fmul", Some(0);
    Dmul = 0x6B, "dmul", Some(0);
    Idiv = 0x6C, "idiv", Some(0);
    Ldiv = 0x6D, "ldiv", Some(0);
    Fdiv = 0x6E, "fdiv", Some(0);
    Ddiv = 0x6F, "ddiv", Some(0);
    Irem = 0x70, "irem", Some(0);
    Lrem = 0x71, "lrem", Some(0);
    Frem = 0x72, "frem", Some(0);
    Drem = 0x73, "drem", Some(0);
    Ineg = 0x74, "ineg", Some(0);
    Lneg = 0x75, "lneg", Some(0);
    Fneg = 0x76, "fneg", Some(0);
    Dneg = 0x77, "dneg", Some(0);
    Ishl = 0x78, "ishl", Some(0);
    Lshl = 0x79, "lshl", Some(0);
    Ishr = 0x7A, "ishr", Some(0);
    Lshr = 0x7B, "lshr", Some(0);
    Iushr = 0x7C, "iushr", Some(0);
    Lushr = 0x7D, "lushr", Some(0);
    Iand = 0x7E, "iand", Some(0);
    Land = 0x7F, "land", Some(0);
    Ior = 0x80, "ior", Some(0);
    Lor = 0x81, "lor", Some(0);
    Ixor = 0x82, "ixor", Some(0);
    Lxor = 0x83, "lxor", Some(0);
    Iinc = 0x84, "iinc", Some(2);

    // ===== Conversions =====
    I2l = 0x85, "i2l", Some(0);
    I2f = 0x86, "i2f", Some(0);
    I2d = 0x87, "i2d", Some(0);
    L2i = 0x88, "l2i", Some(0);
    L2f = 0x89, "l2f", Some(0);
    L2d = 0x8A, "l2d", Some(0);
    F2i = 0x8B, "f2i", Some(0);
    F2l = 0x8C, "f2l", Some(0);
    F2d = 0x8D, "f2d", Some(0);
    D2i = 0x8E, "d2i", Some(0);
    D2l = 0x8F, "d2l", Some(0);
    D2f = 0x90, "d2f", Some(0);
    I2b = 0x91, "i2b", Some(0);
    I2c = 0x92, "i2c", Some(0);
    I2s = 0x93, "i2s", Some(0);

    // ===== Comparisons =====
    Lcmp = 0x94, "lcmp", Some(0);
    Fcmpl = 0x95, "fcmpl", Some(0);
    Fcmpg = 0x96, "fcmpg", Some(0);
    Dcmpl = 0x97, "dcmpl", Some(0);
    Dcmpg = 0x98, "dcmpg", Some(0);
    Ifeq = 0x99, "ifeq", Some(2);
    Ifne = 0x9A, "ifne", Some(2);
    Iflt = 0x9B, "iflt", Some(2);
    Ifge = 0x9C, "ifge", Some(2);
    Ifgt = 0x9D, "ifgt", Some(2);
    Ifle = 0x9E, "ifle", Some(2);
    IfIcmpeq = 0x9F, "if_icmpeq", Some(2);
    IfIcmpne = 0xA0, "if_icmpne", Some(2);
    IfIcmplt = 0xA1, "if_icmplt", Some(2);
    IfIcmpge = 0xA2, "if_icmpge", Some(2);
    IfIcmpgt = 0xA3, "if_icmpgt", Some(2);
    IfIcmple = 0xA4, "if_icmple", Some(2);
    IfAcmpeq = 0xA5, "if_acmpeq", Some(2);
    IfAcmpne = 0xA6, "if_acmpne", Some(2);

    // ===== Control Flow =====
    Goto = 0xA7, "goto", Some(2);
    Jsr = 0xA8, "jsr", Some(2);
    Ret = 0xA9, "ret", Some(1);
    Tableswitch = 0xAA, "tableswitch", None;
    Lookupswitch = 0xAB, "lookupswitch", None;
    Ireturn = 0xAC, "ireturn", Some(0);
    Lreturn = 0xAD, "lreturn", Some(0);
    Freturn = 0xAE, "freturn", Some(0);
    Dreturn = 0xAF, "dreturn", Some(0);
    Areturn = 0xB0, "areturn", Some(0);
    Return = 0xB1, "return", Some(0);

    // ===== References =====
    Getstatic = 0xB2, "getstatic", Some(2);
    Putstatic = 0xB3, "putstatic", Some(2);
    Getfield = 0xB4, "getfield", Some(2);
    Putfield = 0xB5, "putfield", Some(2);
    Invokevirtual = 0xB6, "invokevirtual", Some(2);
    Invokespecial = 0xB7, "invokespecial", Some(2);
    Invokestatic = 0xB8, "invokestatic", Some(2);
    Invokeinterface = 0xB9, "invokeinterface", Some(4);
    Invokedynamic = 0xBA, "invokedynamic", Some(4);
    New = 0xBB, "new", Some(2);
    Newarray = 0xBC, "newarray", Some(1);
    Anewarray = 0xBD, "anewarray", Some(2);
    Arraylength = 0xBE, "arraylength", Some(0);
    Athrow = 0xBF, "athrow", Some(0);
    Checkcast = 0xC0, "checkcast", Some(2);
    Instanceof = 0xC1, "instanceof", Some(2);
    Monitorenter = 0xC2, "monitorenter", Some(0);
    Monitorexit = 0xC3, "monitorexit", Some(0);

    // ===== Extended =====
    Wide = 0xC4, "wide", None;
    Multianewarray = 0xC5, "multianewarray", Some(3);
    Ifnull = 0xC6, "ifnull", Some(2);
    Ifnonnull = 0xC7, "ifnonnull", Some(2);
    GotoW = 0xC8, "goto_w", Some(4);
    JsrW = 0xC9, "jsr_w", Some(4);
}

impl Opcode {
    /// Convert to the raw byte
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Branch instructions whose operand is a relative code offset
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            Opcode::Ifeq
                | Opcode::Ifne
                | Opcode::Iflt
                | Opcode::Ifge
                | Opcode::Ifgt
                | Opcode::Ifle
                | Opcode::IfIcmpeq
                | Opcode::IfIcmpne
                | Opcode::IfIcmplt
                | Opcode::IfIcmpge
                | Opcode::IfIcmpgt
                | Opcode::IfIcmple
                | Opcode::IfAcmpeq
                | Opcode::IfAcmpne
                | Opcode::Goto
                | Opcode::Jsr
                | Opcode::Ifnull
                | Opcode::Ifnonnull
                | Opcode::GotoW
                | Opcode::JsrW
        )
    }

    /// Branches encoded with a 32-bit offset
    pub fn is_wide_branch(self) -> bool {
        matches!(self, Opcode::GotoW | Opcode::JsrW)
    }

    /// Method invocations with a `Methodref`/`InterfaceMethodref` operand
    pub fn is_invoke(self) -> bool {
        matches!(
            self,
            Opcode::Invokevirtual
                | Opcode::Invokespecial
                | Opcode::Invokestatic
                | Opcode::Invokeinterface
        )
    }

    /// Instructions after which control never falls through
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Opcode::Goto
                | Opcode::GotoW
                | Opcode::Ret
                | Opcode::Tableswitch
                | Opcode::Lookupswitch
                | Opcode::Ireturn
                | Opcode::Lreturn
                | Opcode::Freturn
                | Opcode::Dreturn
                | Opcode::Areturn
                | Opcode::Return
                | Opcode::Athrow
        )
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}
