//! The embedded runtime ABI header.
//!
//! Every generated translation unit starts with this fixed C prelude: the
//! tagged-value layout, the call-frame structs, accessor macros and extern
//! declarations for the runtime entry points emitted code calls. The text
//! is versioned ([`ABI_VERSION`]) and self-checking: `_Static_assert`s pin
//! the value layout, and the factory function references the runtime's
//! exported anchor constant so linking against a runtime built for a
//! different ABI revision fails at link time instead of corrupting memory
//! at run time.

use lume_ir::TypeSet;

/// Version of the runtime ABI described by [`RUNTIME_HEADER`].
pub const ABI_VERSION: u32 = 1;

/// `sizeof(LumeValue)` pinned by the header's `_Static_assert`.
pub const VALUE_SIZE: usize = 16;

/// C prelude emitted verbatim at the top of every translation unit.
pub const RUNTIME_HEADER: &str = r#"/*
** Lume runtime ABI, revision 1. Mirrors the runtime's internal layout;
** regenerate rather than edit.
*/
#include <stdint.h>
#include <stddef.h>

#ifdef _WIN32
#define LUME_EXPORT __declspec(dllexport)
#else
#define LUME_EXPORT
#endif

#define LUME_ABI_VERSION 1

typedef int64_t lume_Int;
typedef uint64_t lume_Unsigned;
typedef double lume_Float;

typedef struct lume_State lume_State;
typedef int (*lume_CFunc)(lume_State *L);

/* GC header shared by all collectable objects */
typedef struct LumeHeader {
    struct LumeHeader *next;
    uint8_t tt;
    uint8_t marked;
} LumeHeader;

typedef union LumeUnion {
    LumeHeader *gc;
    void *p;
    int b;
    lume_CFunc f;
    lume_Int i;
    lume_Float n;
} LumeUnion;

typedef struct LumeValue {
    LumeUnion u;
    int tag;
} LumeValue;

/* Base type tags live in bits 0-3, variants in bits 4-5, bit 6 marks
** collectable values. */
#define LUME_TNIL 0
#define LUME_TBOOL 1
#define LUME_TNUM 3
#define LUME_TSTR 4
#define LUME_TTAB 5
#define LUME_TFUNC 6
#define LUME_TUSER 7

#define LUME_TNUMINT (LUME_TNUM | (0 << 4))
#define LUME_TNUMFLT (LUME_TNUM | (1 << 4))
#define LUME_TSHRSTR (LUME_TSTR | (0 << 4))
#define LUME_TLNGSTR (LUME_TSTR | (1 << 4))
#define LUME_TLCL (LUME_TFUNC | (0 << 4))
#define LUME_TIARRAY (LUME_TTAB | (1 << 4))
#define LUME_TFARRAY (LUME_TTAB | (2 << 4))

#define LUME_COLLECTABLE (1 << 6)

#define lm_tag(o) ((o)->tag)
#define lm_rawtag(o) ((o)->tag & 0x3F)
#define lm_settag(o, t) ((o)->tag = (t))

#define lm_isnil(o) (lm_tag(o) == LUME_TNIL)
#define lm_isbool(o) (lm_tag(o) == LUME_TBOOL)
#define lm_isint(o) (lm_tag(o) == LUME_TNUMINT)
#define lm_isflt(o) (lm_tag(o) == LUME_TNUMFLT)
#define lm_isnum(o) ((lm_tag(o) & 0x0F) == LUME_TNUM)
#define lm_istab(o) (lm_rawtag(o) == LUME_TTAB)
#define lm_isiarr(o) (lm_rawtag(o) == LUME_TIARRAY)
#define lm_isfarr(o) (lm_rawtag(o) == LUME_TFARRAY)
#define lm_isstr(o) ((lm_tag(o) & 0x0F) == LUME_TSTR)
#define lm_isshrstr(o) (lm_rawtag(o) == LUME_TSHRSTR)
#define lm_isclosure(o) (lm_rawtag(o) == LUME_TLCL)
#define lm_falsy(o) (lm_isnil(o) || (lm_isbool(o) && (o)->u.b == 0))

#define lm_int(o) ((o)->u.i)
#define lm_flt(o) ((o)->u.n)
#define lm_bool(o) ((o)->u.b)
#define lm_gc(o) ((o)->u.gc)
#define lm_str(o) ((LumeStr *)lm_gc(o))
#define lm_tab(o) ((LumeTable *)lm_gc(o))
#define lm_arr(o) ((LumeArray *)lm_gc(o))
#define lm_closure(o) ((LumeClosure *)lm_gc(o))

#define lm_setnil(o) lm_settag(o, LUME_TNIL)
#define lm_setbool(o, v) { LumeValue *io_ = (o); io_->u.b = (v); lm_settag(io_, LUME_TBOOL); }
#define lm_setint(o, v) { LumeValue *io_ = (o); io_->u.i = (v); lm_settag(io_, LUME_TNUMINT); }
#define lm_setflt(o, v) { LumeValue *io_ = (o); io_->u.n = (v); lm_settag(io_, LUME_TNUMFLT); }
#define lm_copy(d, s) { LumeValue *d_ = (d); const LumeValue *s_ = (s); d_->u = s_->u; d_->tag = s_->tag; }
#define lm_setstr(L, o, x) { LumeValue *io_ = (o); LumeStr *s_ = (x); io_->u.gc = (LumeHeader *)s_; lm_settag(io_, s_->h.tt | LUME_COLLECTABLE); }
#define lm_setclosure(L, o, x) { LumeValue *io_ = (o); io_->u.gc = (LumeHeader *)(x); lm_settag(io_, LUME_TLCL | LUME_COLLECTABLE); }

extern int lumeV_toint_(const LumeValue *o, lume_Int *i);
extern int lumeV_toflt_(const LumeValue *o, lume_Float *n);
#define lm_toint(o, pi) (lm_isint(o) ? (*(pi) = lm_int(o), 1) : lumeV_toint_(o, pi))
#define lm_tofloat(o, pn) (lm_isflt(o) ? (*(pn) = lm_flt(o), 1) : lumeV_toflt_(o, pn))
#define lm_tofloat_nostr(o, pn) \
    (lm_isflt(o) ? (*(pn) = lm_flt(o), 1) : \
     (lm_isint(o) ? (*(pn) = (lume_Float)lm_int(o), 1) : 0))

/* Wrapping integer arithmetic, defined on the unsigned representation */
#define lm_intop(op, a, b) ((lume_Int)((lume_Unsigned)(a) op (lume_Unsigned)(b)))

typedef struct LumeStr {
    LumeHeader h;
    uint32_t hash;
    size_t len;
    /* string bytes follow inline */
} LumeStr;

typedef struct LumeTable LumeTable; /* opaque to generated code */

typedef struct LumeArray {
    LumeHeader h;
    uint8_t flags;
    uint32_t len;
    uint32_t size;
    char *data;
} LumeArray;

typedef struct LumeUpval {
    LumeHeader h;
    LumeValue *v; /* stack slot while open, own storage once closed */
} LumeUpval;

/* Static type codes in ptype: 0 any, 1 integer, 2 float, 3 integer array,
** 4 float array, 5 table, 6 string, 7 closure, 8 userdata, 9 boolean. */
typedef struct LumeUpvalDesc {
    LumeStr *name;
    uint8_t instack;
    uint8_t idx;
    uint32_t ptype;
} LumeUpvalDesc;

typedef struct LumeProto {
    LumeHeader h;
    uint8_t numparams;
    uint8_t is_vararg;
    uint8_t maxstacksize;
    int sizek;
    int sizeupvals;
    int sizep;
    LumeValue *k;
    struct LumeProto **p;
    LumeUpvalDesc *upvals;
    lume_CFunc entry;
    int status;
} LumeProto;

#define LUME_FN_COMPILED 1

typedef struct LumeClosure {
    LumeHeader h;
    uint8_t nupvals;
    LumeProto *p;
    LumeUpval *upvals[1]; /* sized by nupvals */
} LumeClosure;

typedef struct LumeCallInfo {
    LumeValue *func;
    LumeValue *top;
    LumeValue *base;
    struct LumeCallInfo *previous;
    short nresults;
    unsigned short jitstatus;
} LumeCallInfo;

struct lume_State {
    LumeHeader h;
    uint8_t status;
    LumeValue *top;
    LumeValue *stack;
    LumeValue *stack_last;
    int stacksize;
    LumeCallInfo *ci;
    void *global;
};

/* Frame access in generated bodies. R() indexes the running frame, K()
** the prototype's constants, S() the caller-visible result window. */
#define R(i) (base + (i))
#define K(i) (k + (i))
#define S(i) (stackbase + (i))
#define lume_stackoverflow(L, n) (((int)((L)->top - (L)->stack) + (n) + 5) >= (L)->stacksize)

/* Operator codes for lumeO_arith; lumeT_trybinmeta shares the numbering */
#define LUME_OPADD 0
#define LUME_OPSUB 1
#define LUME_OPMUL 2
#define LUME_OPMOD 3
#define LUME_OPPOW 4
#define LUME_OPDIV 5
#define LUME_OPIDIV 6
#define LUME_OPBAND 7
#define LUME_OPBOR 8
#define LUME_OPBXOR 9
#define LUME_OPSHL 10
#define LUME_OPSHR 11
#define LUME_OPUNM 12
#define LUME_OPBNOT 13

#define LUME_MM_ADD LUME_OPADD
#define LUME_MM_SUB LUME_OPSUB
#define LUME_MM_MUL LUME_OPMUL
#define LUME_MM_UNM LUME_OPUNM

/*
** Error codes passed to lumeV_raise:
**   1 integer expected            10 upvalue needs table
**   2 number expected             11 'for' initial value must be a number
**   3 integer array expected      12 'for' limit must be a number
**   4 number array expected       13 'for' step must be a number
**   5 table expected              14 array index out of bounds
**   6 upvalue needs integer       15 string expected
**   7 upvalue needs number        16 closure expected
**   8 upvalue needs integer array 17 type mismatch on user-defined type
**   9 upvalue needs number array
*/
extern void lumeV_raise(lume_State *L, int err_code);

extern int lumeD_precall(lume_State *L, LumeValue *func, int nresults, int op_call);
extern void lumeD_growstack(lume_State *L, int n);
extern void lumeD_inctop(lume_State *L);
extern int lumeV_execute(lume_State *L);
extern void lumeV_gettable(lume_State *L, const LumeValue *t, LumeValue *key, LumeValue *val);
extern void lumeV_settable(lume_State *L, const LumeValue *t, LumeValue *key, LumeValue *val);
extern void lumeV_gettable_str(lume_State *L, const LumeValue *t, LumeValue *key, LumeValue *val);
extern void lumeV_settable_str(lume_State *L, const LumeValue *t, LumeValue *key, LumeValue *val);
extern void lumeV_gettable_int(lume_State *L, const LumeValue *t, LumeValue *key, LumeValue *val);
extern void lumeV_settable_int(lume_State *L, const LumeValue *t, LumeValue *key, LumeValue *val);
extern int lumeV_equal(lume_State *L, const LumeValue *a, const LumeValue *b);
extern int lumeV_lessthan(lume_State *L, const LumeValue *a, const LumeValue *b);
extern int lumeV_lessequal(lume_State *L, const LumeValue *a, const LumeValue *b);
extern void lumeV_objlen(lume_State *L, LumeValue *dst, const LumeValue *obj);
extern lume_Int lumeV_shiftleft(lume_Int x, lume_Int y);
extern void lumeV_bnot(lume_State *L, LumeValue *dst, LumeValue *src);
extern void lumeV_newtable(lume_State *L, LumeCallInfo *ci, LumeValue *dst);
extern void lumeV_newarray_int(lume_State *L, LumeCallInfo *ci, LumeValue *dst);
extern void lumeV_newarray_flt(lume_State *L, LumeCallInfo *ci, LumeValue *dst);
extern void lumeV_closure(lume_State *L, LumeCallInfo *ci, LumeClosure *cl, int dst_reg, int proto_idx);
extern int lumeV_usertype_check(lume_State *L, LumeStr *name, const LumeValue *o);
extern void lumeO_arith(lume_State *L, int op, const LumeValue *a, const LumeValue *b, LumeValue *dst);
extern void lumeT_trybinmeta(lume_State *L, const LumeValue *a, const LumeValue *b, LumeValue *dst, int event);
extern void lumeF_close(lume_State *L, LumeValue *level);
extern LumeClosure *lumeF_newclosure(lume_State *L, int nupvals);
extern LumeProto *lumeF_newproto(lume_State *L);
extern LumeStr *lumeS_new(lume_State *L, const char *str, size_t len);
extern void *lumeM_newvector_(lume_State *L, size_t count, size_t size);
#define lumeM_newvector(L, n, t) ((t *)lumeM_newvector_(L, (n), sizeof(t)))
extern void lumeA_seti(lume_State *L, LumeArray *a, lume_Unsigned key, lume_Int value);
extern void lumeA_setf(lume_State *L, LumeArray *a, lume_Unsigned key, lume_Float value);

/* ABI anchor: resolves only against a runtime built for this revision */
extern const int lume_abi_v1;

_Static_assert(sizeof(lume_Int) == 8, "lume_Int must be 64-bit");
_Static_assert(sizeof(LumeValue) == 16, "LumeValue must pack into 16 bytes");
"#;

/// Static type code stored in an emitted `LumeUpvalDesc.ptype`.
pub(crate) fn type_code(ty: TypeSet) -> u32 {
    if ty.is_integer() {
        1
    } else if ty.is_float() {
        2
    } else if ty.is_int_array() {
        3
    } else if ty.is_flt_array() {
        4
    } else if ty.is_table() {
        5
    } else if ty.is_string() {
        6
    } else if ty.is_closure() {
        7
    } else if ty.is_userdata() {
        8
    } else if ty.is_boolean() {
        9
    } else {
        0
    }
}
